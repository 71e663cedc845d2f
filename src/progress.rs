// src/progress.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub current: usize,
    pub total: usize,
    pub current_file: String,
}

impl ScanProgress {
    pub fn new(total: usize) -> Self {
        Self {
            current: 0,
            total,
            current_file: String::new(),
        }
    }

    pub fn update(&mut self, processed: usize, current_file: &str) {
        self.current = processed;
        self.current_file = current_file.to_string();
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }

    pub fn message(&self) -> String {
        format!("Processed {}/{} files", self.current, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_message() {
        let mut progress = ScanProgress::new(3);
        assert!(!progress.is_complete());
        progress.update(3, "/books/c.mp3");
        assert_eq!(progress.message(), "Processed 3/3 files");
        assert_eq!(progress.current_file, "/books/c.mp3");
        assert!(progress.is_complete());
    }
}
