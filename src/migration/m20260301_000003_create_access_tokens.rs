//! Migration: Create access_tokens table.
//!
//! The core lifecycle entity. Status is a closed set enforced with a CHECK
//! constraint; the partial indexes back the expiry-sweep predicates.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE access_tokens (
                    id UUID PRIMARY KEY,
                    token VARCHAR(128) NOT NULL UNIQUE,
                    name VARCHAR(255) NOT NULL,
                    user_id UUID REFERENCES users(id) ON DELETE SET NULL,
                    service_id UUID NOT NULL REFERENCES services(id),
                    status VARCHAR(10) NOT NULL DEFAULT 'active'
                        CHECK (status IN ('active', 'expired', 'revoked')),
                    notified BOOLEAN NOT NULL DEFAULT FALSE,
                    version INTEGER NOT NULL DEFAULT 1,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    expires_at TIMESTAMPTZ NOT NULL,
                    renewed_at TIMESTAMPTZ,

                    CHECK (expires_at > created_at)
                );

                -- Sweep phase 1: active tokens past their expiry horizon
                CREATE INDEX idx_access_tokens_active_expiry
                    ON access_tokens(expires_at)
                    WHERE status = 'active';

                -- Sweep phase 2: expired tokens awaiting notification
                CREATE INDEX idx_access_tokens_unnotified
                    ON access_tokens(expires_at)
                    WHERE status = 'expired' AND notified = FALSE;

                -- Per-user listing
                CREATE INDEX idx_access_tokens_user_id
                    ON access_tokens(user_id)
                    WHERE user_id IS NOT NULL;

                -- Trigger to update updated_at
                CREATE TRIGGER update_access_tokens_updated_at
                    BEFORE UPDATE ON access_tokens
                    FOR EACH ROW
                    EXECUTE FUNCTION update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                DROP TRIGGER IF EXISTS update_access_tokens_updated_at ON access_tokens;
                DROP TABLE IF EXISTS access_tokens CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}
