//! Width/depth limits for one function and their resolution from partial overrides.

use serde::{Deserialize, Serialize};

pub const DEFAULT_DEPTH: u32 = 0;
pub const DEFAULT_BRANCH_MIN_WIDTH: u32 = 3;
pub const DEFAULT_BRANCH_MAX_WIDTH: u32 = 6;
pub const DEFAULT_LEAF_MIN_WIDTH: u32 = 5;
pub const DEFAULT_LEAF_MAX_WIDTH: u32 = 10;

/// Fully resolved limits. Immutable once built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameters {
    pub depth: u32,
    pub branch_min_width: u32,
    pub branch_max_width: u32,
    pub leaf_min_width: u32,
    pub leaf_max_width: u32,
}

impl Default for Parameters {
    fn default() -> Self {
        ParameterOverrides::default().resolve()
    }
}

impl Parameters {
    pub fn is_branch(&self) -> bool {
        self.depth > 0
    }

    /// Task-count bounds for this function's depth class.
    pub fn width(&self) -> WidthRange {
        if self.is_branch() {
            WidthRange::new(self.branch_min_width, self.branch_max_width)
        } else {
            WidthRange::new(self.leaf_min_width, self.leaf_max_width)
        }
    }

    /// Parameters handed to the children of this function.
    pub fn for_children(&self) -> Self {
        Self {
            depth: self.depth.saturating_sub(1),
            ..*self
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WidthRange {
    pub min: u32,
    pub max: u32,
}

impl WidthRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, n: usize) -> bool {
        n >= self.min as usize && n <= self.max as usize
    }

    /// "5" or "between 5 and 10", as used in step prompts.
    pub fn describe(&self) -> String {
        if self.min == self.max {
            self.min.to_string()
        } else {
            format!("between {} and {}", self.min, self.max)
        }
    }
}

/// Partial overrides. Per category the most specific field wins:
/// `<category><Min|Max>Width` > `<category>Width` > `<min|max>Width` > `width` > default.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterOverrides {
    pub depth: Option<u32>,
    pub branch_min_width: Option<u32>,
    pub branch_max_width: Option<u32>,
    pub branch_width: Option<u32>,
    pub leaf_min_width: Option<u32>,
    pub leaf_max_width: Option<u32>,
    pub leaf_width: Option<u32>,
    pub min_width: Option<u32>,
    pub max_width: Option<u32>,
    pub width: Option<u32>,
}

impl ParameterOverrides {
    pub fn resolve(&self) -> Parameters {
        let (branch_min_width, branch_max_width) = clamp(
            self.branch_min_width
                .or(self.branch_width)
                .or(self.min_width)
                .or(self.width)
                .unwrap_or(DEFAULT_BRANCH_MIN_WIDTH),
            self.branch_max_width
                .or(self.branch_width)
                .or(self.max_width)
                .or(self.width)
                .unwrap_or(DEFAULT_BRANCH_MAX_WIDTH),
        );
        let (leaf_min_width, leaf_max_width) = clamp(
            self.leaf_min_width
                .or(self.leaf_width)
                .or(self.min_width)
                .or(self.width)
                .unwrap_or(DEFAULT_LEAF_MIN_WIDTH),
            self.leaf_max_width
                .or(self.leaf_width)
                .or(self.max_width)
                .or(self.width)
                .unwrap_or(DEFAULT_LEAF_MAX_WIDTH),
        );
        Parameters {
            depth: self.depth.unwrap_or(DEFAULT_DEPTH),
            branch_min_width,
            branch_max_width,
            leaf_min_width,
            leaf_max_width,
        }
    }
}

impl From<Parameters> for ParameterOverrides {
    fn from(p: Parameters) -> Self {
        Self {
            depth: Some(p.depth),
            branch_min_width: Some(p.branch_min_width),
            branch_max_width: Some(p.branch_max_width),
            leaf_min_width: Some(p.leaf_min_width),
            leaf_max_width: Some(p.leaf_max_width),
            ..Default::default()
        }
    }
}

fn clamp(min: u32, max: u32) -> (u32, u32) {
    if min > max {
        (max, max)
    } else {
        (min, max)
    }
}
