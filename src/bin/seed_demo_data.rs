//! CLI tool to populate the database with demo data.
//!
//! Fixture generation only - nothing here defines product behavior. The
//! lifecycle manager never depends on this module.
//!
//! Usage:
//!   cargo run --bin seed-demo-data

use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use rand::RngExt;
use sea_orm::{Database, EntityTrait};
use sea_orm_migration::MigratorTrait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use acme_creds_lib::config::Config;
use acme_creds_lib::entity::{access_token, otp_code, service, user};
use acme_creds_lib::migration::Migrator;
use acme_creds_lib::models::{AccessToken, OtpCode, Service, TokenStatus, User};
use acme_creds_lib::services::otp::generate_code;
use acme_creds_lib::services::tokens::generate_secret;
use acme_creds_lib::store::postgres::PgStore;
use acme_creds_lib::store::CredentialStore;

/// Demo password hashing. Production registration would use a real KDF.
fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn random_time_in_day(day: DateTime<Utc>) -> DateTime<Utc> {
    let start = day
        .with_hour(0)
        .and_then(|d| d.with_minute(0))
        .and_then(|d| d.with_second(0))
        .unwrap_or(day);
    start + Duration::seconds(rand::rng().random_range(0..86_400))
}

fn demo_user(
    email: &str,
    username: &str,
    first_name: &str,
    last_name: &str,
    created_days_ago: i64,
    is_active: bool,
    last_login_days_ago: Option<i64>,
    settings: serde_json::Value,
    now: DateTime<Utc>,
) -> User {
    let created_at = now - Duration::days(created_days_ago);
    User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        username: username.to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        password_hash: hash_password("password123"),
        avatar_url: Some(format!(
            "https://api.dicebear.com/7.x/avataaars/svg?seed={}",
            first_name.to_lowercase()
        )),
        is_active,
        last_login_at: last_login_days_ago.map(|d| now - Duration::days(d)),
        settings,
        version: 1,
        created_at,
        updated_at: created_at,
        deleted_at: None,
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    println!("Seeding database at {}...", config.database_url);

    let db = Database::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    // Clear existing data, children first
    access_token::Entity::delete_many()
        .exec(&db)
        .await
        .expect("Failed to clear access_tokens");
    otp_code::Entity::delete_many()
        .exec(&db)
        .await
        .expect("Failed to clear otp_codes");
    service::Entity::delete_many()
        .exec(&db)
        .await
        .expect("Failed to clear services");
    user::Entity::delete_many()
        .exec(&db)
        .await
        .expect("Failed to clear users");

    let store: Arc<dyn CredentialStore> = Arc::new(PgStore::new(db));
    let now = Utc::now();

    // Users with staggered registration dates
    let users = vec![
        demo_user(
            "john.doe@example.com",
            "johndoe",
            "John",
            "Doe",
            85,
            true,
            Some(0),
            serde_json::json!({"notifications": true, "theme": "dark"}),
            now,
        ),
        demo_user(
            "jane.smith@example.com",
            "janesmith",
            "Jane",
            "Smith",
            70,
            true,
            Some(1),
            serde_json::json!({"notifications": false, "theme": "light"}),
            now,
        ),
        demo_user(
            "bob.johnson@example.com",
            "bobjohnson",
            "Bob",
            "Johnson",
            60,
            false,
            Some(30),
            serde_json::json!({"notifications": true, "theme": "dark"}),
            now,
        ),
        demo_user(
            "alice.williams@example.com",
            "alicewilliams",
            "Alice",
            "Williams",
            45,
            true,
            None,
            serde_json::json!({"notifications": true, "theme": "auto"}),
            now,
        ),
        demo_user(
            "charlie.brown@example.com",
            "charliebrown",
            "Charlie",
            "Brown",
            30,
            true,
            None,
            serde_json::json!({"notifications": true, "theme": "dark"}),
            now,
        ),
    ];
    for u in &users {
        store.insert_user(u).await.expect("Failed to insert user");
    }
    println!("  Created {} users.", users.len());

    // Services
    let service_specs = [
        ("GitHub", "GitHub API integration for repository management"),
        ("Google", "Google OAuth and API services"),
        ("Stripe", "Payment processing and subscription management"),
        ("AWS", "Amazon Web Services cloud infrastructure"),
        ("SendGrid", "Email delivery service"),
    ];
    let mut services = Vec::new();
    for (name, description) in service_specs {
        let s = Service {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: now,
        };
        store
            .insert_service(&s)
            .await
            .expect("Failed to insert service");
        services.push(s);
    }
    println!("  Created {} services.", services.len());

    // OTP codes: two fresh, one already expired and consumed
    let mut otp_count = 0;
    for u in users.iter().take(2) {
        let otp = OtpCode {
            id: Uuid::new_v4(),
            user_id: u.id,
            code: generate_code(),
            expires_at: now + Duration::minutes(10),
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        store.insert_otp(&otp).await.expect("Failed to insert OTP");
        otp_count += 1;
    }
    let stale = OtpCode {
        id: Uuid::new_v4(),
        user_id: users[0].id,
        code: generate_code(),
        expires_at: now - Duration::minutes(10),
        is_active: false,
        created_at: now - Duration::minutes(20),
        updated_at: now - Duration::minutes(10),
        deleted_at: None,
    };
    store
        .insert_otp(&stale)
        .await
        .expect("Failed to insert OTP");
    otp_count += 1;
    println!("  Created {} OTP codes.", otp_count);

    // Access tokens with a realistic daily distribution over 90 days
    let mut rng = rand::rng();
    let start_date = now - Duration::days(90);
    let mut token_count = 0u32;
    let mut active = 0u32;
    let mut expired = 0u32;
    let mut revoked = 0u32;

    for day_offset in 0..90 {
        let current_day = start_date + Duration::days(day_offset);

        // 3-12 tokens per day, recent days slightly busier
        let boost = if day_offset > 60 { 1.5 } else { 1.0 };
        let tokens_for_day = ((3.0 + rng.random_range(0.0..9.0)) * boost) as usize;

        for _ in 0..tokens_for_day {
            let user = &users[rng.random_range(0..users.len())];
            let service = &services[rng.random_range(0..services.len())];
            let created_at = random_time_in_day(current_day);

            // Expiry: 20% in 7-30 days, 50% in 30-60, 30% in 60-120
            let expiry_roll: f64 = rng.random_range(0.0..1.0);
            let days_until_expiry = if expiry_roll < 0.2 {
                rng.random_range(7.0..30.0)
            } else if expiry_roll < 0.7 {
                rng.random_range(30.0..60.0)
            } else {
                rng.random_range(60.0..120.0)
            };
            let expires_at =
                created_at + Duration::seconds((days_until_expiry * 86_400.0) as i64);

            let status = if expires_at < now {
                TokenStatus::Expired
            } else if rng.random_bool(0.1) {
                TokenStatus::Revoked
            } else {
                TokenStatus::Active
            };

            let renewed_at = if status == TokenStatus::Active && rng.random_bool(0.15) {
                let span = (now - created_at).num_seconds().max(1);
                Some(created_at + Duration::seconds(rng.random_range(0..span)))
            } else {
                None
            };

            let token = AccessToken {
                id: Uuid::new_v4(),
                token: generate_secret(),
                name: format!("{} Token - {}", service.name, current_day.format("%Y-%m-%d")),
                user_id: if rng.random_bool(0.15) {
                    None
                } else {
                    Some(user.id)
                },
                service_id: service.id,
                status,
                notified: status == TokenStatus::Expired && rng.random_bool(0.7),
                version: 1,
                created_at,
                expires_at,
                renewed_at,
            };

            store
                .insert_token(&token)
                .await
                .expect("Failed to insert token");
            token_count += 1;
            match status {
                TokenStatus::Active => active += 1,
                TokenStatus::Expired => expired += 1,
                TokenStatus::Revoked => revoked += 1,
            }
        }
    }

    println!("  Created {} access tokens.", token_count);
    println!();
    println!("Token statistics:");
    println!("  - Active: {}", active);
    println!("  - Expired: {}", expired);
    println!("  - Revoked: {}", revoked);
    println!();
    println!("Seeding completed successfully.");
}
