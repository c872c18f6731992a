//! User account operations shared by the auth, users and admin controllers
//! and the `manage` CLI.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::auth::{check_password_policy, hash_password, verify_password};
use crate::error::{AppError, ErrorCode};
use crate::extractors::Pagination;
use crate::models::user::{self, Entity as User, UserCreate, UserUpdate};

/// Emails are compared and stored lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn find_by_email<C: ConnectionTrait>(
    db: &C,
    email: &str,
) -> Result<Option<user::Model>, AppError> {
    Ok(User::find()
        .filter(user::Column::Email.eq(normalize_email(email)))
        .one(db)
        .await?)
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i32) -> Result<user::Model, AppError> {
    User::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))
}

/// Create a user.
///
/// With `safe` set the privilege flags of the payload are ignored and the
/// user starts active, not superuser, not verified.
pub async fn create_user<C: ConnectionTrait>(
    db: &C,
    payload: UserCreate,
    min_password_length: usize,
    safe: bool,
) -> Result<user::Model, AppError> {
    payload.validate()?;
    let email = normalize_email(&payload.email);

    check_password_policy(&payload.password, &email, min_password_length)
        .map_err(|reason| AppError::rejected(ErrorCode::RegisterInvalidPassword, reason))?;

    if find_by_email(db, &email).await?.is_some() {
        return Err(AppError::rejected(
            ErrorCode::RegisterUserAlreadyExists,
            "A user with this email already exists",
        ));
    }

    let (is_active, is_superuser, is_verified) = if safe {
        (true, false, false)
    } else {
        (
            payload.is_active.unwrap_or(true),
            payload.is_superuser.unwrap_or(false),
            payload.is_verified.unwrap_or(false),
        )
    };

    let now = Utc::now().naive_utc();
    let created = user::ActiveModel {
        email: Set(email),
        hashed_password: Set(hash_password(&payload.password)?),
        is_active: Set(is_active),
        is_superuser: Set(is_superuser),
        is_verified: Set(is_verified),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::info!(user_id = created.id, "user registered");
    Ok(created)
}

/// Apply a partial update to `existing`.
pub async fn update_user<C: ConnectionTrait>(
    db: &C,
    existing: user::Model,
    update: UserUpdate,
    min_password_length: usize,
) -> Result<user::Model, AppError> {
    update.validate()?;
    let mut model: user::ActiveModel = existing.clone().into();

    let new_email = update.email.as_deref().map(normalize_email);
    if let Some(email) = new_email.as_ref().filter(|email| **email != existing.email) {
        if find_by_email(db, email).await?.is_some() {
            return Err(AppError::rejected(
                ErrorCode::UpdateUserEmailAlreadyExists,
                "A user with this email already exists",
            ));
        }
        model.email = Set(email.clone());
    }

    if let Some(password) = update.password.as_deref() {
        let email = new_email.as_deref().unwrap_or(&existing.email);
        check_password_policy(password, email, min_password_length)
            .map_err(|reason| AppError::rejected(ErrorCode::UpdateUserInvalidPassword, reason))?;
        model.hashed_password = Set(hash_password(password)?);
    }

    if let Some(is_active) = update.is_active {
        model.is_active = Set(is_active);
    }
    if let Some(is_superuser) = update.is_superuser {
        model.is_superuser = Set(is_superuser);
    }
    if let Some(is_verified) = update.is_verified {
        model.is_verified = Set(is_verified);
    }

    model.updated_at = Set(Utc::now().naive_utc());
    Ok(model.update(db).await?)
}

/// Set a new password without the policy checks of [`update_user`].
pub async fn set_password<C: ConnectionTrait>(
    db: &C,
    existing: user::Model,
    password: &str,
) -> Result<user::Model, AppError> {
    let mut model: user::ActiveModel = existing.into();
    model.hashed_password = Set(hash_password(password)?);
    model.updated_at = Set(Utc::now().naive_utc());
    Ok(model.update(db).await?)
}

/// Look the user up and check the password. Inactive users never pass.
pub async fn authenticate<C: ConnectionTrait>(
    db: &C,
    email: &str,
    password: &str,
) -> Result<Option<user::Model>, AppError> {
    let Some(user) = find_by_email(db, email).await? else {
        // Hash anyway so unknown emails take as long as wrong passwords.
        let _ = hash_password(password);
        return Ok(None);
    };
    if !verify_password(password, &user.hashed_password)? || !user.is_active {
        return Ok(None);
    }
    Ok(Some(user))
}

pub async fn count_users<C: ConnectionTrait>(db: &C) -> Result<u64, AppError> {
    Ok(User::find().count(db).await?)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Id,
    Email,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Search and sort options of user listings.
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct UserFilter {
    /// Case-insensitive substring of the email
    pub search: Option<String>,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub order: SortOrder,
}

/// One page of users plus the total number of matches.
pub async fn list_users<C: ConnectionTrait>(
    db: &C,
    filter: &UserFilter,
    page: &Pagination,
) -> Result<(Vec<user::Model>, u64), AppError> {
    let mut query = User::find();
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        query = query.filter(user::Column::Email.contains(search.to_lowercase()));
    }

    let total = query.clone().count(db).await?;

    let order = match filter.order {
        SortOrder::Asc => Order::Asc,
        SortOrder::Desc => Order::Desc,
    };
    let column = match filter.sort {
        SortField::Id => user::Column::Id,
        SortField::Email => user::Column::Email,
    };
    let users = query
        .order_by(column, order)
        .limit(page.limit)
        .offset(page.offset)
        .all(db)
        .await?;

    Ok((users, total))
}
