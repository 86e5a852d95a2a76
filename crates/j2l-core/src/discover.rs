//! Paginated discovery of source entities

use crate::error::MigrationError;
use j2l_model::{KindFilter, SearchRequest, SourceIssue, SourceTracker};

/// Page size of every discovery search
pub const PAGE_SIZE: usize = 100;

/// Fetch every issue matching `filter` in `project`, in key order
///
/// # Errors
/// The first failed page.
pub async fn discover(
    source: &dyn SourceTracker,
    project: &str,
    kind: KindFilter,
    filter: Option<&str>,
) -> Result<Vec<SourceIssue>, MigrationError> {
    let mut issues = Vec::new();
    let mut request = SearchRequest {
        project: project.to_string(),
        kind,
        filter: filter.map(str::to_string),
        start_at: 0,
        max_results: PAGE_SIZE,
    };

    loop {
        tracing::debug!(query = %request.query(), start_at = request.start_at, "searching source issues");
        let page = source
            .search_issues(&request)
            .await
            .map_err(|err| MigrationError::remote("search issues", err))?;

        let fetched = page.issues.len();
        issues.extend(page.issues);
        if fetched == 0 || page.start_at + fetched >= page.total {
            break;
        }
        request.start_at = page.start_at + fetched;
    }

    tracing::info!(project, ?kind, count = issues.len(), "discovered source entities");
    Ok(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use j2l_model::{EntityKind, SnapshotSource, SourceProject, SourceSnapshot};
    use std::collections::BTreeMap;

    fn snapshot(issues: usize, epics: usize) -> SnapshotSource {
        let mut all: Vec<SourceIssue> = (1..=issues)
            .map(|i| SourceIssue::new(format!("PROJ-{i}"), EntityKind::Issue, format!("issue {i}")))
            .collect();
        all.extend(
            (1..=epics).map(|i| SourceIssue::new(format!("PROJ-{}", 1000 + i), EntityKind::Epic, format!("epic {i}"))),
        );
        SnapshotSource::new(SourceSnapshot {
            project: SourceProject {
                key: "PROJ".into(),
                name: "Project".into(),
                description: None,
                versions: Vec::new(),
            },
            issues: all,
            attachments: BTreeMap::new(),
            users: Vec::new(),
        })
    }

    #[tokio::test]
    async fn walks_every_page() {
        let source = snapshot(250, 3);
        let issues = discover(&source, "PROJ", KindFilter::ExcludeEpics, None).await.unwrap();
        assert_eq!(issues.len(), 250);
        assert!(issues.iter().all(|i| i.kind == EntityKind::Issue));

        let epics = discover(&source, "PROJ", KindFilter::EpicsOnly, Some("labels = x")).await.unwrap();
        assert_eq!(epics.len(), 3);
    }

    #[tokio::test]
    async fn empty_project_stops_after_one_page() {
        let source = snapshot(0, 0);
        assert!(discover(&source, "PROJ", KindFilter::EpicsOnly, None).await.unwrap().is_empty());
    }
}
