use serde::Serialize;
use tokio::time::Instant;

use crate::backend::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Idle,
    Extracting,
    Ready,
    Failed,
}

/// Chapter index paired positionally with its labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOfContents {
    pages: Vec<u32>,
    labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub page_index: usize,
    pub page_number: u32,
    pub label: String,
}

impl TableOfContents {
    pub fn new(pages: Vec<u32>, labels: Vec<String>) -> Self {
        Self { pages, labels }
    }

    pub fn pages(&self) -> &[u32] {
        &self.pages
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn is_valid(&self) -> bool {
        !self.pages.is_empty() && self.pages.len() == self.labels.len()
    }

    /// Entries pointing inside a book of `page_count` pages (1-based page numbers).
    pub fn entries_for(&self, page_count: usize) -> Vec<TocEntry> {
        if !self.is_valid() {
            return Vec::new();
        }
        self.pages
            .iter()
            .zip(&self.labels)
            .filter_map(|(&page_number, label)| {
                let page_index = usize::try_from(page_number).ok()?.checked_sub(1)?;
                (page_index < page_count).then(|| TocEntry {
                    page_index,
                    page_number,
                    label: label.clone(),
                })
            })
            .collect()
    }

    pub fn label_for_index(&self, index: usize, page_count: usize) -> Option<String> {
        self.entries_for(page_count)
            .into_iter()
            .rev()
            .find(|entry| entry.page_index == index)
            .map(|entry| entry.label)
    }
}

/// A non-empty image sequence with a cursor that always points inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pages {
    images: Vec<String>,
    current: usize,
}

impl Pages {
    pub fn new(images: Vec<String>) -> Option<Self> {
        if images.is_empty() {
            return None;
        }
        Some(Self { images, current: 0 })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn current_image(&self) -> &str {
        &self.images[self.current]
    }

    /// Current page first, then the previous and next ones when they exist.
    pub fn window(&self) -> Vec<&str> {
        let mut window = vec![self.current_image()];
        if self.current > 0 {
            window.push(&self.images[self.current - 1]);
        }
        if self.current + 1 < self.images.len() {
            window.push(&self.images[self.current + 1]);
        }
        window
    }

    pub fn go_prev(&mut self) -> bool {
        self.set(self.current.saturating_sub(1))
    }

    pub fn go_next(&mut self) -> bool {
        self.set((self.current + 1).min(self.images.len() - 1))
    }

    /// Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize) -> bool {
        if index >= self.images.len() || index == self.current {
            return false;
        }
        self.current = index;
        true
    }

    pub fn jump_clamped(&mut self, index: usize) {
        self.current = index.min(self.images.len() - 1);
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    /// `None` until the backend accepted the submission.
    pub task_id: Option<TaskId>,
    pub progress: u32,
    pub status_message: String,
    pub started_at: Instant,
}

#[derive(Debug, Clone)]
pub struct Reading {
    pub task_id: TaskId,
    pub pages: Pages,
    pub status_message: String,
    pub image_loaded: bool,
}

#[derive(Debug, Clone)]
pub enum Phase {
    Idle,
    Extracting(Extraction),
    Ready(Reading),
    Failed { error: String },
}

impl Phase {
    pub fn status(&self) -> SessionStatus {
        match self {
            Phase::Idle => SessionStatus::Idle,
            Phase::Extracting(_) => SessionStatus::Extracting,
            Phase::Ready(_) => SessionStatus::Ready,
            Phase::Failed { .. } => SessionStatus::Failed,
        }
    }

    pub fn progress(&self) -> u32 {
        match self {
            Phase::Extracting(extraction) => extraction.progress,
            Phase::Ready(_) => 100,
            Phase::Idle | Phase::Failed { .. } => 0,
        }
    }

    pub fn status_message(&self) -> &str {
        match self {
            Phase::Extracting(extraction) => &extraction.status_message,
            Phase::Ready(reading) => &reading.status_message,
            Phase::Idle | Phase::Failed { .. } => "",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Phase::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            Phase::Extracting(extraction) => extraction.task_id.as_deref(),
            Phase::Ready(reading) => Some(&reading.task_id),
            Phase::Idle | Phase::Failed { .. } => None,
        }
    }

    pub fn pages(&self) -> Option<&Pages> {
        match self {
            Phase::Ready(reading) => Some(&reading.pages),
            _ => None,
        }
    }

    pub fn images(&self) -> &[String] {
        self.pages().map(Pages::images).unwrap_or(&[])
    }

    pub fn current_index(&self) -> usize {
        self.pages().map(Pages::current).unwrap_or(0)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Phase::Extracting(_))
    }
}
