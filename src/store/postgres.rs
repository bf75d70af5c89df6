//! SeaORM-backed `CredentialStore` over PostgreSQL.
//!
//! Conditional updates are issued as filtered `update_many` statements so
//! the status/version check and the write happen in one statement; a
//! `rows_affected` of zero means the predicate no longer matched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::prelude::Expr;
use sea_orm::sea_query::ExprTrait;
use sea_orm::*;
use uuid::Uuid;

use crate::entity::{access_token, otp_code, service, user};
use crate::error::{AppError, AppResult};
use crate::models::{AccessToken, OtpCode, Service, TokenStatus, User};

use super::{CredentialStore, TokenPatch, UserPatch};

/// PostgreSQL store.
#[derive(Clone)]
pub struct PgStore {
    db: DatabaseConnection,
}

impl PgStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Access the underlying connection (migrations, seeding).
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn insert_user(&self, u: &User) -> AppResult<()> {
        // Check uniqueness up front for a clean error; the unique indexes
        // remain the backstop under concurrency.
        let taken = user::Entity::find()
            .filter(
                Condition::any()
                    .add(user::Column::Email.eq(&u.email))
                    .add(user::Column::Username.eq(&u.username)),
            )
            .one(&self.db)
            .await?;

        if let Some(existing) = taken {
            let field = if existing.email == u.email {
                "email"
            } else {
                "username"
            };
            return Err(AppError::InvalidInput(format!("{} already taken", field)));
        }

        let model = user::ActiveModel {
            id: Set(u.id),
            email: Set(u.email.clone()),
            username: Set(u.username.clone()),
            first_name: Set(u.first_name.clone()),
            last_name: Set(u.last_name.clone()),
            password_hash: Set(u.password_hash.clone()),
            avatar_url: Set(u.avatar_url.clone()),
            is_active: Set(u.is_active),
            last_login_at: Set(u.last_login_at),
            settings: Set(u.settings.clone()),
            version: Set(u.version),
            created_at: Set(u.created_at),
            updated_at: Set(u.updated_at),
            deleted_at: Set(u.deleted_at),
        };

        user::Entity::insert(model).exec(&self.db).await?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let result = user::Entity::find_by_id(id)
            .filter(user::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?;

        Ok(result.map(model_to_user))
    }

    async fn update_user_if_version(
        &self,
        id: Uuid,
        expected_version: i32,
        patch: UserPatch,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut query = user::Entity::update_many()
            .filter(user::Column::Id.eq(id))
            .filter(user::Column::DeletedAt.is_null())
            .filter(user::Column::Version.eq(expected_version))
            .col_expr(
                user::Column::Version,
                Expr::col(user::Column::Version).add(1),
            )
            .col_expr(user::Column::UpdatedAt, Expr::value(now));

        if let Some(last_login_at) = patch.last_login_at {
            query = query.col_expr(user::Column::LastLoginAt, Expr::value(Some(last_login_at)));
        }
        if let Some(settings) = patch.settings {
            query = query.col_expr(user::Column::Settings, Expr::value(settings));
        }

        let result = query.exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn soft_delete_user(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let result = user::Entity::update_many()
            .filter(user::Column::Id.eq(id))
            .filter(user::Column::DeletedAt.is_null())
            .col_expr(user::Column::DeletedAt, Expr::value(Some(now)))
            .col_expr(user::Column::IsActive, Expr::value(false))
            .col_expr(
                user::Column::Version,
                Expr::col(user::Column::Version).add(1),
            )
            .col_expr(user::Column::UpdatedAt, Expr::value(now))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(false);
        }

        // The FK cascade only fires on hard deletes, so drop the user's
        // OTP codes explicitly.
        otp_code::Entity::delete_many()
            .filter(otp_code::Column::UserId.eq(id))
            .exec(&self.db)
            .await?;

        Ok(true)
    }

    async fn insert_service(&self, s: &Service) -> AppResult<()> {
        let existing = service::Entity::find()
            .filter(service::Column::Name.eq(&s.name))
            .one(&self.db)
            .await?;

        if existing.is_some() {
            return Err(AppError::InvalidInput(format!(
                "service name already exists: {}",
                s.name
            )));
        }

        let model = service::ActiveModel {
            id: Set(s.id),
            name: Set(s.name.clone()),
            description: Set(s.description.clone()),
            created_at: Set(s.created_at),
        };

        service::Entity::insert(model).exec(&self.db).await?;
        Ok(())
    }

    async fn get_service(&self, id: Uuid) -> AppResult<Option<Service>> {
        let result = service::Entity::find_by_id(id).one(&self.db).await?;
        Ok(result.map(model_to_service))
    }

    async fn list_services(&self) -> AppResult<Vec<Service>> {
        let results = service::Entity::find()
            .order_by_asc(service::Column::Name)
            .all(&self.db)
            .await?;

        Ok(results.into_iter().map(model_to_service).collect())
    }

    async fn insert_token(&self, t: &AccessToken) -> AppResult<()> {
        let model = access_token::ActiveModel {
            id: Set(t.id),
            token: Set(t.token.clone()),
            name: Set(t.name.clone()),
            user_id: Set(t.user_id),
            service_id: Set(t.service_id),
            status: Set(t.status.as_str().to_string()),
            notified: Set(t.notified),
            version: Set(t.version),
            created_at: Set(t.created_at),
            updated_at: Set(t.created_at),
            expires_at: Set(t.expires_at),
            renewed_at: Set(t.renewed_at),
        };

        access_token::Entity::insert(model).exec(&self.db).await?;
        Ok(())
    }

    async fn get_token(&self, id: Uuid) -> AppResult<Option<AccessToken>> {
        let result = access_token::Entity::find_by_id(id).one(&self.db).await?;
        result.map(model_to_token).transpose()
    }

    async fn update_token_if(
        &self,
        id: Uuid,
        expected_status: &[TokenStatus],
        expected_version: Option<i32>,
        patch: TokenPatch,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut query = access_token::Entity::update_many()
            .filter(access_token::Column::Id.eq(id))
            .filter(
                access_token::Column::Status
                    .is_in(expected_status.iter().map(|s| s.as_str())),
            )
            .col_expr(
                access_token::Column::Version,
                Expr::col(access_token::Column::Version).add(1),
            )
            .col_expr(access_token::Column::UpdatedAt, Expr::value(now));

        if let Some(expected) = expected_version {
            query = query.filter(access_token::Column::Version.eq(expected));
        }

        if let Some(status) = patch.status {
            query = query.col_expr(
                access_token::Column::Status,
                Expr::value(status.as_str()),
            );
        }
        if let Some(secret) = patch.token {
            query = query.col_expr(access_token::Column::Token, Expr::value(secret));
        }
        if let Some(expires_at) = patch.expires_at {
            query = query.col_expr(access_token::Column::ExpiresAt, Expr::value(expires_at));
        }
        if let Some(renewed_at) = patch.renewed_at {
            query = query.col_expr(
                access_token::Column::RenewedAt,
                Expr::value(Some(renewed_at)),
            );
        }
        if let Some(notified) = patch.notified {
            query = query.col_expr(access_token::Column::Notified, Expr::value(notified));
        }

        let result = query.exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn expire_due_tokens(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = access_token::Entity::update_many()
            .filter(access_token::Column::Status.eq(TokenStatus::Active.as_str()))
            .filter(access_token::Column::ExpiresAt.lte(now))
            .col_expr(
                access_token::Column::Status,
                Expr::value(TokenStatus::Expired.as_str()),
            )
            .col_expr(
                access_token::Column::Version,
                Expr::col(access_token::Column::Version).add(1),
            )
            .col_expr(access_token::Column::UpdatedAt, Expr::value(now))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    async fn find_expired_unnotified(&self, limit: u64) -> AppResult<Vec<AccessToken>> {
        let results = access_token::Entity::find()
            .filter(access_token::Column::Status.eq(TokenStatus::Expired.as_str()))
            .filter(access_token::Column::Notified.eq(false))
            .order_by_asc(access_token::Column::ExpiresAt)
            .order_by_asc(access_token::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;

        results.into_iter().map(model_to_token).collect()
    }

    async fn mark_notified(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let result = access_token::Entity::update_many()
            .filter(access_token::Column::Id.eq(id))
            .filter(access_token::Column::Status.eq(TokenStatus::Expired.as_str()))
            .filter(access_token::Column::Notified.eq(false))
            .col_expr(access_token::Column::Notified, Expr::value(true))
            .col_expr(
                access_token::Column::Version,
                Expr::col(access_token::Column::Version).add(1),
            )
            .col_expr(access_token::Column::UpdatedAt, Expr::value(now))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn list_expiring_page(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<AccessToken>> {
        let results = access_token::Entity::find()
            .filter(access_token::Column::Status.eq(TokenStatus::Active.as_str()))
            .filter(access_token::Column::ExpiresAt.gte(from))
            .filter(access_token::Column::ExpiresAt.lte(until))
            .order_by_asc(access_token::Column::ExpiresAt)
            .order_by_asc(access_token::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await?;

        results.into_iter().map(model_to_token).collect()
    }

    async fn insert_otp(&self, otp: &OtpCode) -> AppResult<()> {
        let model = otp_code::ActiveModel {
            id: Set(otp.id),
            user_id: Set(otp.user_id),
            code: Set(otp.code.clone()),
            expires_at: Set(otp.expires_at),
            is_active: Set(otp.is_active),
            created_at: Set(otp.created_at),
            updated_at: Set(otp.updated_at),
            deleted_at: Set(otp.deleted_at),
        };

        otp_code::Entity::insert(model).exec(&self.db).await?;
        Ok(())
    }

    async fn active_otps_for_user(&self, user_id: Uuid) -> AppResult<Vec<OtpCode>> {
        let results = otp_code::Entity::find()
            .filter(otp_code::Column::UserId.eq(user_id))
            .filter(otp_code::Column::IsActive.eq(true))
            .filter(otp_code::Column::DeletedAt.is_null())
            .order_by_desc(otp_code::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(results.into_iter().map(model_to_otp).collect())
    }

    async fn deactivate_otps_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = otp_code::Entity::update_many()
            .filter(otp_code::Column::UserId.eq(user_id))
            .filter(otp_code::Column::IsActive.eq(true))
            .filter(otp_code::Column::DeletedAt.is_null())
            .col_expr(otp_code::Column::IsActive, Expr::value(false))
            .col_expr(otp_code::Column::UpdatedAt, Expr::value(now))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    async fn consume_otp(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let result = otp_code::Entity::update_many()
            .filter(otp_code::Column::Id.eq(id))
            .filter(otp_code::Column::IsActive.eq(true))
            .filter(otp_code::Column::DeletedAt.is_null())
            .col_expr(otp_code::Column::IsActive, Expr::value(false))
            .col_expr(otp_code::Column::UpdatedAt, Expr::value(now))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn expire_due_otps(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = otp_code::Entity::update_many()
            .filter(otp_code::Column::IsActive.eq(true))
            .filter(otp_code::Column::DeletedAt.is_null())
            .filter(otp_code::Column::ExpiresAt.lte(now))
            .col_expr(otp_code::Column::IsActive, Expr::value(false))
            .col_expr(otp_code::Column::UpdatedAt, Expr::value(now))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}

fn model_to_user(m: user::Model) -> User {
    User {
        id: m.id,
        email: m.email,
        username: m.username,
        first_name: m.first_name,
        last_name: m.last_name,
        password_hash: m.password_hash,
        avatar_url: m.avatar_url,
        is_active: m.is_active,
        last_login_at: m.last_login_at,
        settings: m.settings,
        version: m.version,
        created_at: m.created_at,
        updated_at: m.updated_at,
        deleted_at: m.deleted_at,
    }
}

fn model_to_service(m: service::Model) -> Service {
    Service {
        id: m.id,
        name: m.name,
        description: m.description,
        created_at: m.created_at,
    }
}

fn model_to_token(m: access_token::Model) -> AppResult<AccessToken> {
    let status = TokenStatus::parse(&m.status)
        .ok_or_else(|| AppError::Database(format!("unknown token status: {}", m.status)))?;

    Ok(AccessToken {
        id: m.id,
        token: m.token,
        name: m.name,
        user_id: m.user_id,
        service_id: m.service_id,
        status,
        notified: m.notified,
        version: m.version,
        created_at: m.created_at,
        expires_at: m.expires_at,
        renewed_at: m.renewed_at,
    })
}

fn model_to_otp(m: otp_code::Model) -> OtpCode {
    OtpCode {
        id: m.id,
        user_id: m.user_id,
        code: m.code,
        expires_at: m.expires_at,
        is_active: m.is_active,
        created_at: m.created_at,
        updated_at: m.updated_at,
        deleted_at: m.deleted_at,
    }
}
