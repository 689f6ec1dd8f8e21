use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::session::SessionRow;

pub async fn list_active_sessions(
    pool: &PgPool,
    restaurant_id: Uuid,
    table_number: &str,
) -> Result<Vec<SessionRow>, sqlx::Error> {
    sqlx::query_as::<_, SessionRow>(
        r#"
        SELECT id, session_token, device_ip, restaurant_id, table_number, is_main_device, created_at, expires_at, last_activity, order_data
        FROM device_sessions
        WHERE restaurant_id = $1 AND table_number = $2 AND expires_at > NOW()
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(restaurant_id)
    .bind(table_number)
    .fetch_all(pool)
    .await
}

/// Inserts a session claim. Expired rows in the table scope are swept in the
/// same transaction so a stale main claim cannot block a fresh election; a
/// live main claim surfaces as a unique violation on the single-main index.
#[allow(clippy::too_many_arguments)]
pub async fn create_session(
    pool: &PgPool,
    session_token: &str,
    device_ip: &str,
    restaurant_id: Uuid,
    table_number: &str,
    is_main_device: bool,
    expires_at: DateTime<Utc>,
    order_data: &serde_json::Value,
) -> Result<SessionRow, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        DELETE FROM device_sessions
        WHERE restaurant_id = $1 AND table_number = $2 AND expires_at <= NOW()
        "#,
    )
    .bind(restaurant_id)
    .bind(table_number)
    .execute(&mut *tx)
    .await?;

    let row = sqlx::query_as::<_, SessionRow>(
        r#"
        INSERT INTO device_sessions
            (session_token, device_ip, restaurant_id, table_number, is_main_device, expires_at, order_data)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, session_token, device_ip, restaurant_id, table_number, is_main_device, created_at, expires_at, last_activity, order_data
        "#,
    )
    .bind(session_token)
    .bind(device_ip)
    .bind(restaurant_id)
    .bind(table_number)
    .bind(is_main_device)
    .bind(expires_at)
    .bind(order_data)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

pub async fn find_session_by_token(
    pool: &PgPool,
    session_token: &str,
) -> Result<Option<SessionRow>, sqlx::Error> {
    sqlx::query_as::<_, SessionRow>(
        r#"
        SELECT id, session_token, device_ip, restaurant_id, table_number, is_main_device, created_at, expires_at, last_activity, order_data
        FROM device_sessions
        WHERE session_token = $1 AND expires_at > NOW()
        "#,
    )
    .bind(session_token)
    .fetch_optional(pool)
    .await
}

pub async fn update_order_data(
    pool: &PgPool,
    session_token: &str,
    order_data: &serde_json::Value,
) -> Result<Option<SessionRow>, sqlx::Error> {
    sqlx::query_as::<_, SessionRow>(
        r#"
        UPDATE device_sessions
        SET order_data = $1, last_activity = NOW()
        WHERE session_token = $2 AND expires_at > NOW()
        RETURNING id, session_token, device_ip, restaurant_id, table_number, is_main_device, created_at, expires_at, last_activity, order_data
        "#,
    )
    .bind(order_data)
    .bind(session_token)
    .fetch_optional(pool)
    .await
}

pub async fn touch_session(pool: &PgPool, session_token: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE device_sessions
        SET last_activity = NOW()
        WHERE session_token = $1 AND expires_at > NOW()
        "#,
    )
    .bind(session_token)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_session(
    pool: &PgPool,
    session_token: &str,
) -> Result<Option<SessionRow>, sqlx::Error> {
    sqlx::query_as::<_, SessionRow>(
        r#"
        DELETE FROM device_sessions
        WHERE session_token = $1
        RETURNING id, session_token, device_ip, restaurant_id, table_number, is_main_device, created_at, expires_at, last_activity, order_data
        "#,
    )
    .bind(session_token)
    .fetch_optional(pool)
    .await
}

/// Moves the main role from `old_token` to `new_token` in one transaction,
/// carrying the cart snapshot across. Returns the promoted row, or `None`
/// when either end no longer holds an unexpired session.
pub async fn transfer_main_device(
    pool: &PgPool,
    old_token: &str,
    new_token: &str,
) -> Result<Option<SessionRow>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let demoted = sqlx::query_as::<_, SessionRow>(
        r#"
        UPDATE device_sessions
        SET is_main_device = FALSE, last_activity = NOW()
        WHERE session_token = $1 AND is_main_device AND expires_at > NOW()
        RETURNING id, session_token, device_ip, restaurant_id, table_number, is_main_device, created_at, expires_at, last_activity, order_data
        "#,
    )
    .bind(old_token)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(demoted) = demoted else {
        return Ok(None);
    };

    sqlx::query(
        r#"
        DELETE FROM device_sessions
        WHERE restaurant_id = $1 AND table_number = $2 AND expires_at <= NOW()
        "#,
    )
    .bind(demoted.restaurant_id)
    .bind(&demoted.table_number)
    .execute(&mut *tx)
    .await?;

    let promoted = sqlx::query_as::<_, SessionRow>(
        r#"
        UPDATE device_sessions
        SET is_main_device = TRUE, order_data = $1, last_activity = NOW()
        WHERE session_token = $2
          AND restaurant_id = $3 AND table_number = $4
          AND expires_at > NOW()
        RETURNING id, session_token, device_ip, restaurant_id, table_number, is_main_device, created_at, expires_at, last_activity, order_data
        "#,
    )
    .bind(&demoted.order_data)
    .bind(new_token)
    .bind(demoted.restaurant_id)
    .bind(&demoted.table_number)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(promoted) = promoted else {
        return Ok(None);
    };

    tx.commit().await?;
    Ok(Some(promoted))
}

/// Claims the main role for `session_token` if no other device on the table
/// holds it. Returns `None` when the row is gone or a live main exists; a
/// losing race surfaces as a unique violation on the single-main index.
pub async fn promote_session(
    pool: &PgPool,
    session_token: &str,
) -> Result<Option<SessionRow>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    // Expired rows still occupy the single-main index; sweep the scope first.
    sqlx::query(
        r#"
        DELETE FROM device_sessions
        WHERE expires_at <= NOW()
          AND (restaurant_id, table_number) IN (
              SELECT restaurant_id, table_number FROM device_sessions WHERE session_token = $1
          )
        "#,
    )
    .bind(session_token)
    .execute(&mut *tx)
    .await?;

    let promoted = sqlx::query_as::<_, SessionRow>(
        r#"
        UPDATE device_sessions AS s
        SET is_main_device = TRUE, last_activity = NOW()
        WHERE s.session_token = $1
          AND s.expires_at > NOW()
          AND NOT EXISTS (
              SELECT 1 FROM device_sessions o
              WHERE o.restaurant_id = s.restaurant_id
                AND o.table_number = s.table_number
                AND o.session_token <> s.session_token
                AND o.is_main_device
                AND o.expires_at > NOW()
          )
        RETURNING id, session_token, device_ip, restaurant_id, table_number, is_main_device, created_at, expires_at, last_activity, order_data
        "#,
    )
    .bind(session_token)
    .fetch_optional(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(promoted)
}

pub async fn cleanup_expired_sessions(
    pool: &PgPool,
    restaurant_id: Uuid,
    table_number: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM device_sessions
        WHERE restaurant_id = $1 AND table_number = $2 AND expires_at <= NOW()
        "#,
    )
    .bind(restaurant_id)
    .bind(table_number)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
