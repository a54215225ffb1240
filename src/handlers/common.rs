use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListParams {
    #[param(default = 20, minimum = 1, maximum = 100)]
    pub limit: Option<u64>,
}

impl ListParams {
    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }
}
