//! Tests for the queue pager.

use super::*;
use std::sync::Mutex;

/// Admin stub serving a fixed name list and recording each page request
struct RecordingAdmin {
    names: Vec<&'static str>,
    page_size: u32,
    fail_at_skip: Option<u32>,
    requests: Mutex<Vec<(u32, u32)>>,
}

impl RecordingAdmin {
    fn new(names: Vec<&'static str>, page_size: u32) -> Self {
        Self {
            names,
            page_size,
            fail_at_skip: None,
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl QueueAdmin for RecordingAdmin {
    async fn list_queues_page(&self, skip: u32, top: u32) -> Result<Vec<QueueName>, QueueError> {
        self.requests.lock().unwrap().push((skip, top));

        if self.fail_at_skip == Some(skip) {
            return Err(QueueError::ConnectionFailed {
                message: "connection reset".to_string(),
            });
        }

        Ok(self
            .names
            .iter()
            .skip(skip as usize)
            .take(top as usize)
            .map(|name| QueueName::from(*name))
            .collect())
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }
}

#[tokio::test]
async fn test_pager_walks_all_pages_until_empty() {
    // Arrange
    let admin = RecordingAdmin::new(vec!["a", "b", "c"], 2);
    let mut pager = QueuePager::new(&admin);

    // Act
    let mut seen = Vec::new();
    while let Some(page) = pager.next_page().await.unwrap() {
        seen.extend(page.into_iter().map(|q| q.as_str().to_string()));
    }

    // Assert
    assert_eq!(seen, vec!["a", "b", "c"]);
    assert_eq!(
        *admin.requests.lock().unwrap(),
        vec![(0, 2), (2, 2), (3, 2)]
    );
}

#[tokio::test]
async fn test_pager_on_empty_namespace() {
    let admin = RecordingAdmin::new(vec![], 10);
    let mut pager = QueuePager::new(&admin);

    assert!(pager.next_page().await.unwrap().is_none());
    // Exhausted pagers do not go back to the service.
    assert!(pager.next_page().await.unwrap().is_none());
    assert_eq!(admin.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_pager_surfaces_errors_after_earlier_pages() {
    let mut admin = RecordingAdmin::new(vec!["a", "b", "c"], 2);
    admin.fail_at_skip = Some(2);
    let mut pager = QueuePager::new(&admin);

    let first = pager.next_page().await.unwrap().unwrap();
    assert_eq!(first.len(), 2);

    let err = pager.next_page().await.unwrap_err();
    assert!(matches!(err, QueueError::ConnectionFailed { .. }));
}
