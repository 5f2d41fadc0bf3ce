use serde::{Deserialize, Serialize};

// --- API Endpoints ---
pub const HEALTH_PATH: &str = "/health";

pub const STATUS_UP: &str = "up";
pub const STATUS_DOWN: &str = "down";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HealthComponents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthComponents {
    pub store: String,
}

impl HealthResponse {
    pub fn from_store(connected: bool) -> Self {
        let status = if connected { STATUS_UP } else { STATUS_DOWN };
        Self {
            status: status.to_string(),
            components: HealthComponents {
                store: status.to_string(),
            },
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == STATUS_UP
    }
}
