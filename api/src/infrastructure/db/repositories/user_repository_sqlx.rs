use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::application::ports::user_repository::{NewUser, UserRepository, UserRow};
use crate::infrastructure::db::PgPool;

const USER_COLUMNS: &str = "id, email, role, password_hash, picture_bkey, created_at";

pub struct SqlxUserRepository {
    pub pool: PgPool,
}

impl SqlxUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_row(r: PgRow) -> anyhow::Result<UserRow> {
    let role: String = r.get("role");
    Ok(UserRow {
        id: r.get("id"),
        email: r.get("email"),
        role: role.parse()?,
        password_hash: r.try_get("password_hash").ok(),
        picture_bkey: r.try_get("picture_bkey").ok().flatten(),
        created_at: r.get("created_at"),
    })
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create_user(&self, user: &NewUser) -> anyhow::Result<Option<UserRow>> {
        let row = sqlx::query(&format!(
            r#"INSERT INTO users (id, email, password_hash, role) VALUES ($1, $2, $3, $4)
               ON CONFLICT (email) DO NOTHING
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(map_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserRow>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(map_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<UserRow>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(map_row).transpose()
    }

    async fn first_user(&self) -> anyhow::Result<Option<UserRow>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.map(map_row).transpose()
    }

    async fn list_users(&self) -> anyhow::Result<Vec<UserRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_row).collect()
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_picture(&self, id: Uuid, bkey: &str) -> anyhow::Result<Option<Option<String>>> {
        // The subquery reads the pre-update row, so the replaced key comes back.
        let row = sqlx::query(
            r#"UPDATE users u SET picture_bkey = $2
               FROM (SELECT id, picture_bkey FROM users WHERE id = $1 FOR UPDATE) old
               WHERE u.id = old.id
               RETURNING old.picture_bkey AS previous"#,
        )
        .bind(id)
        .bind(bkey)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.try_get::<Option<String>, _>("previous").ok().flatten()))
    }

    async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
