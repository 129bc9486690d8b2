use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Movie {
    pub id: Uuid,
    pub name: String,
    /// Running time, used to chain showtimes in one theater.
    pub length_minutes: i32,
}

impl Movie {
    pub fn new(name: impl Into<String>, length_minutes: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            length_minutes,
        }
    }
}
