use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::User;

pub const CROP_STATUS_GROWING: &str = "growing";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Crop {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub status: String,
    pub expected_harvest_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct OwnedCrop {
    pub crop: Crop,
    pub owner: User,
}
