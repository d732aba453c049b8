//! Class-balance classification.

use std::collections::BTreeMap;

/// How evenly images are spread across classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceLevel {
    /// Every class has the same count.
    WellBalanced,
    /// Largest to smallest ratio is above 1 and at most 2.
    Moderate,
    /// Largest to smallest ratio exceeds 2.
    Imbalanced,
}

impl BalanceLevel {
    /// Classifies from the largest and smallest class counts.
    #[must_use]
    pub fn classify(max_count: usize, min_count: usize) -> Self {
        if max_count == min_count {
            return Self::WellBalanced;
        }
        if min_count == 0 {
            return Self::Imbalanced;
        }
        let ratio = max_count as f64 / min_count as f64;
        if ratio > 2.0 {
            Self::Imbalanced
        } else {
            Self::Moderate
        }
    }

    /// Report sentence for this level.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::WellBalanced => "The dataset is well-balanced.",
            Self::Moderate => {
                "The dataset has a moderate class imbalance. You may want to consider balancing the classes."
            }
            Self::Imbalanced => {
                "WARNING: The dataset is imbalanced. Consider applying techniques to balance the classes."
            }
        }
    }
}

/// Per-class image counts, ordered by class label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassCounts(pub BTreeMap<String, usize>);

impl ClassCounts {
    /// Adds `count` images to `label`.
    pub fn add(&mut self, label: &str, count: usize) {
        *self.0.entry(label.to_string()).or_insert(0) += count;
    }

    /// Balance level, or `None` when there are no classes.
    #[must_use]
    pub fn level(&self) -> Option<BalanceLevel> {
        let max = self.0.values().copied().max()?;
        let min = self.0.values().copied().min()?;
        Some(BalanceLevel::classify(max, min))
    }

    /// Renders the counts report. `None` when there are no classes.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        let level = self.level()?;
        let mut out = String::new();
        for (label, count) in &self.0 {
            out.push_str(&format!("Number of class '{label}' images: {count}\n"));
        }
        out.push_str(&format!("\n{}\n", level.message()));
        Some(out)
    }
}
