use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A registered client application; its `client_id` is a token audience.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Application {
    pub id: Uuid,
    pub name: String,
    pub client_id: String,
}

impl Application {
    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Application>> {
        let apps = sqlx::query_as::<_, Application>(
            "SELECT id, name, client_id FROM applications ORDER BY name",
        )
        .fetch_all(db)
        .await
        .context("list applications")?;
        Ok(apps)
    }

    /// `name: client_id`, one per line.
    pub fn listing_line(&self) -> String {
        format!("{}: {}", self.name, self.client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_listing_line() {
        let app = Application {
            id: Uuid::new_v4(),
            name: "Web".into(),
            client_id: "userbase-web".into(),
        };
        assert_eq!(app.listing_line(), "Web: userbase-web");
    }
}
