//! Status vocabularies for requests and routing steps.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Request category. Determines the control-number prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Green,
    Yellow,
    White,
    Orange,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Green => "green",
            Category::Yellow => "yellow",
            Category::White => "white",
            Category::Orange => "orange",
        }
    }

    /// Control-number prefix letter for this category.
    pub fn prefix(self) -> char {
        match self {
            Category::Green => 'G',
            Category::Yellow => 'Y',
            Category::White => 'W',
            Category::Orange => 'O',
        }
    }

    pub fn parse(s: &str) -> Option<Category> {
        match s {
            "green" => Some(Category::Green),
            "yellow" => Some(Category::Yellow),
            "white" => Some(Category::White),
            "orange" => Some(Category::Orange),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a job request. Exactly one holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Routing,
    Completed,
    Checked,
    Cancelled,
    Closed,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Routing => "Routing",
            RequestStatus::Completed => "Completed",
            RequestStatus::Checked => "Checked",
            RequestStatus::Cancelled => "Cancelled",
            RequestStatus::Closed => "Closed",
            RequestStatus::Rejected => "Rejected",
        }
    }

    pub fn parse(s: &str) -> Option<RequestStatus> {
        match s {
            "Routing" => Some(RequestStatus::Routing),
            "Completed" => Some(RequestStatus::Completed),
            "Checked" => Some(RequestStatus::Checked),
            "Cancelled" => Some(RequestStatus::Cancelled),
            "Closed" => Some(RequestStatus::Closed),
            "Rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }

    /// Terminal statuses admit no further workflow operations.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Closed | RequestStatus::Cancelled | RequestStatus::Rejected
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single routing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Submitted,
    Processing,
    Approved,
    Rejected,
    Cancelled,
    Pending,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Submitted => "Submitted",
            StepStatus::Processing => "Processing",
            StepStatus::Approved => "Approved",
            StepStatus::Rejected => "Rejected",
            StepStatus::Cancelled => "Cancelled",
            StepStatus::Pending => "Pending",
        }
    }

    pub fn parse(s: &str) -> Option<StepStatus> {
        match s {
            "Submitted" => Some(StepStatus::Submitted),
            "Processing" => Some(StepStatus::Processing),
            "Approved" => Some(StepStatus::Approved),
            "Rejected" => Some(StepStatus::Rejected),
            "Cancelled" => Some(StepStatus::Cancelled),
            "Pending" => Some(StepStatus::Pending),
            _ => None,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
