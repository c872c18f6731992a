//! `manage db ...` commands.

use cvitanok_core::accounts;
use cvitanok_core::migrations::Migrator;
use cvitanok_core::models::{User, user};
use cvitanok_core::provider::BoxError;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, QuerySelect};
use sea_orm_migration::MigratorTrait;

pub const NO_USERS: &str = "No users found in the database.";

pub async fn count_users(db: &DatabaseConnection) -> Result<u64, BoxError> {
    Ok(accounts::count_users(db).await?)
}

/// The first `limit` users by id.
pub async fn list_users(db: &DatabaseConnection, limit: u64) -> Result<Vec<user::Model>, BoxError> {
    Ok(User::find()
        .order_by_asc(user::Column::Id)
        .limit(limit)
        .all(db)
        .await?)
}

/// Apply pending migrations, returning how many ran.
pub async fn migrate(db: &DatabaseConnection) -> Result<usize, BoxError> {
    let pending = Migrator::get_pending_migrations(db).await?.len();
    Migrator::up(db, None).await?;
    Ok(pending)
}

fn mark(flag: bool) -> &'static str {
    if flag { "✓" } else { "✗" }
}

/// Plain-text table of `users`, or [`NO_USERS`].
pub fn render_users_table(users: &[user::Model], limit: u64) -> String {
    if users.is_empty() {
        return NO_USERS.to_string();
    }

    const HEADERS: [&str; 5] = ["ID", "Email", "Active", "Superuser", "Verified"];
    let rows: Vec<[String; 5]> = users
        .iter()
        .map(|u| {
            [
                u.id.to_string(),
                u.email.clone(),
                mark(u.is_active).to_string(),
                mark(u.is_superuser).to_string(),
                mark(u.is_verified).to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| {
                let pad = width - cell.chars().count();
                format!("{cell}{}", " ".repeat(pad))
            })
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };
    let rule = widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>()
        .join("-+-");

    let mut out = vec![
        format!("Users (showing up to {limit})"),
        line(&HEADERS.map(String::from)),
        rule,
    ];
    out.extend(rows.iter().map(|row| line(row)));
    out.join("\n")
}
