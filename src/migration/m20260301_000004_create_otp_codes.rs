//! Migration: Create otp_codes table.
//!
//! Single-use verification codes, owned exclusively by one user and
//! hard-deleted with the user via the FK cascade.

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
                CREATE TABLE otp_codes (
                    id UUID PRIMARY KEY,
                    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    code VARCHAR(6) NOT NULL,
                    expires_at TIMESTAMPTZ NOT NULL,
                    is_active BOOLEAN NOT NULL DEFAULT TRUE,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    deleted_at TIMESTAMPTZ
                );

                -- Verification and expiry-sweep lookups
                CREATE INDEX idx_otp_codes_active
                    ON otp_codes(is_active, expires_at)
                    WHERE deleted_at IS NULL;

                -- Per-user code history
                CREATE INDEX idx_otp_codes_user_id
                    ON otp_codes(user_id, created_at);

                -- Trigger to update updated_at
                CREATE TRIGGER update_otp_codes_updated_at
                    BEFORE UPDATE ON otp_codes
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
                DROP TRIGGER IF EXISTS update_otp_codes_updated_at ON otp_codes;
                DROP TABLE IF EXISTS otp_codes CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}
