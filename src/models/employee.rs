use serde::{Deserialize, Serialize};

/// Directory entry for one staff member. `manager_id` scopes analytics to
/// a manager's team; absent means the employee reports outside any scoped
/// manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRecord {
    pub user_id: String,
    pub full_name: String,
    pub is_active: bool,
    pub manager_id: Option<String>,
}
