//! Attachment upload and trailing attachment notes
//!
//! Every attachment of a source entity is uploaded to the issue project, the
//! only container with an upload endpoint. Hosted URLs are made absolute so
//! epic bodies living in the group resolve them too.

use crate::config::MigrationConfig;
use crate::error::MigrationError;
use futures::stream::{self, StreamExt, TryStreamExt};
use j2l_markup::{AttachmentRef, AttachmentTable};
use j2l_model::{NewNote, SourceAttachment, SourceTracker, TargetEntity, TargetTracker};

pub struct AttachmentResolver<'a> {
    config: &'a MigrationConfig,
    source: &'a dyn SourceTracker,
    target: &'a dyn TargetTracker,
}

impl<'a> AttachmentResolver<'a> {
    #[must_use]
    pub fn new(config: &'a MigrationConfig, source: &'a dyn SourceTracker, target: &'a dyn TargetTracker) -> Self {
        Self { config, source, target }
    }

    /// Upload every attachment once and build the reference table in source order
    ///
    /// # Errors
    /// [`MigrationError::Attachment`] naming the first attachment that failed.
    pub async fn resolve(&self, attachments: &[SourceAttachment]) -> Result<AttachmentTable, MigrationError> {
        if attachments.is_empty() {
            return Ok(AttachmentTable::new());
        }

        let resolved: Vec<AttachmentRef> = stream::iter(attachments)
            .map(|attachment| self.upload(attachment))
            .buffered(self.config.concurrency.attachments)
            .try_collect()
            .await?;

        tracing::debug!(count = resolved.len(), "attachments uploaded");
        Ok(resolved.into_iter().collect())
    }

    async fn upload(&self, attachment: &SourceAttachment) -> Result<AttachmentRef, MigrationError> {
        let failed = |source| MigrationError::Attachment {
            filename: attachment.filename.clone(),
            source,
        };

        let content = self.source.download_attachment(&attachment.id).await.map_err(failed)?;
        let hosted = self
            .target
            .upload_file(&self.config.target.issue_project, &attachment.filename, content)
            .await
            .map_err(failed)?;

        let url = self.config.upload_url(&hosted.url);
        Ok(AttachmentRef {
            filename: attachment.filename.clone(),
            source_id: attachment.id.clone(),
            markdown: hosted.markdown.replace(&hosted.url, &url),
            alt: hosted.alt,
            url,
            created_at: attachment.created_at,
        })
    }

    /// Post every attachment not referenced inline as its own note, in
    /// source order, carrying the attachment's creation time
    ///
    /// # Errors
    /// The first failed note; later attachments are not posted.
    pub async fn post_unconsumed(
        &self,
        entity: &TargetEntity,
        table: &AttachmentTable,
        consumed: &[String],
    ) -> Result<usize, MigrationError> {
        let mut posted = 0;
        for attachment in table.unconsumed(consumed) {
            let note = NewNote {
                body: attachment.markdown.clone(),
                created_at: Some(attachment.created_at),
            };
            self.target
                .create_note(entity, &note)
                .await
                .map_err(|err| MigrationError::remote("create attachment note", err))?;
            posted += 1;
        }
        Ok(posted)
    }
}
