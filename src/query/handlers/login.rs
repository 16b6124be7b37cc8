//! Login, logout and password verification.
//!
//! The login-attempt row is always recorded outside the transaction so
//! the attempt counters survive a rollback; a PENDING outcome records
//! nothing because the whole operation will be retried.

use tracing::{error, warn};

use crate::crypto::verify_password;
use crate::db::DatabaseSession;
use crate::error::QueryManagerError;
use crate::query::worker::SharedHostCache;
use crate::query::{Query, QueryStatus};
use crate::store;
use crate::transaction::TransactionScope;

use super::parse_ip;

/// Failed-attempt windows and ceilings shared by every login flavour.
const ACCOUNT_ATTEMPT_WINDOW: i64 = 5 * 60;
const ACCOUNT_ATTEMPT_LIMIT: i32 = 10;
const IP_ATTEMPT_WINDOW: i64 = 30 * 60;
const IP_ATTEMPT_LIMIT: i32 = 20;

pub async fn internal_resolve_world(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let world_name = request.read_string(30);

    match store::worlds::world_id(db, &world_name).await? {
        Some(world_id) if world_id > 0 => {
            query.world_id = world_id;
            query.ok();
        }
        _ => query.failed(),
    }
    Ok(())
}

async fn check_account_password_tx(
    db: &mut DatabaseSession,
    query: &mut Query,
    account_id: i32,
    password: &str,
    ip_address: u32,
) -> Result<(), QueryManagerError> {
    let mut tx = TransactionScope::new("CheckAccountPassword");
    tx.begin(db).await?;

    let account = store::accounts::account_data(db, account_id).await?;
    let Some(account) = account else {
        tx.rollback(db).await?;
        query.error(1);
        return Ok(());
    };
    if !verify_password(&account.auth, password) {
        tx.rollback(db).await?;
        query.error(2);
        return Ok(());
    }

    let failed =
        store::accounts::account_failed_login_attempts(db, account_id, ACCOUNT_ATTEMPT_WINDOW)
            .await?;
    if failed > ACCOUNT_ATTEMPT_LIMIT {
        tx.rollback(db).await?;
        query.error(3);
        return Ok(());
    }
    let failed =
        store::accounts::ip_failed_login_attempts(db, ip_address, IP_ATTEMPT_WINDOW).await?;
    if failed > IP_ATTEMPT_LIMIT {
        tx.rollback(db).await?;
        query.error(4);
        return Ok(());
    }

    tx.commit(db).await?;
    query.ok();
    Ok(())
}

pub async fn check_account_password(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let account_id = request.read_u32() as i32;
    let password = request.read_string(30);
    let ip_text = request.read_string(16);

    let Some(ip_address) = parse_ip(&ip_text) else {
        query.failed();
        return Ok(());
    };

    let result = check_account_password_tx(db, query, account_id, &password, ip_address).await;
    record_login_attempt(db, query, account_id, ip_address).await;
    result
}

async fn login_account_tx(
    db: &mut DatabaseSession,
    hosts: &SharedHostCache,
    query: &mut Query,
    account_id: i32,
    password: &str,
    ip_address: u32,
) -> Result<(), QueryManagerError> {
    let mut tx = TransactionScope::new("LoginAccount");
    tx.begin(db).await?;

    let account = store::accounts::account_data(db, account_id).await?;
    let Some(account) = account else {
        tx.rollback(db).await?;
        query.error(1);
        return Ok(());
    };
    if !verify_password(&account.auth, password) {
        tx.rollback(db).await?;
        query.error(2);
        return Ok(());
    }

    let failed =
        store::accounts::account_failed_login_attempts(db, account_id, ACCOUNT_ATTEMPT_WINDOW)
            .await?;
    if failed > ACCOUNT_ATTEMPT_LIMIT {
        tx.rollback(db).await?;
        query.error(3);
        return Ok(());
    }
    let failed =
        store::accounts::ip_failed_login_attempts(db, ip_address, IP_ATTEMPT_WINDOW).await?;
    if failed > IP_ATTEMPT_LIMIT {
        tx.rollback(db).await?;
        query.error(4);
        return Ok(());
    }

    if store::banishments::is_account_banished(db, account_id).await? {
        tx.rollback(db).await?;
        query.error(5);
        return Ok(());
    }
    if store::banishments::is_ip_banished(db, ip_address).await? {
        tx.rollback(db).await?;
        query.error(6);
        return Ok(());
    }

    let characters = store::characters::character_endpoints(db, account_id).await?;
    tx.commit(db).await?;

    query.begin_response(QueryStatus::Ok);
    let count = characters.len().min(u8::MAX as usize);
    query.response.write_u8(count as u8);
    for character in &characters[..count] {
        query.response.write_string(&character.name);
        query.response.write_string(&character.world_name);

        let address = hosts.lock().await.resolve(&character.world_host).await;
        match address {
            Some(address) => {
                query.response.write_u32_be(u32::from(address));
                query.response.write_u16(character.world_port as u16);
            }
            None => {
                error!(
                    "failed to resolve world \"{}\" host \"{}\" for character \"{}\"",
                    character.world_name, character.world_host, character.name
                );
                query.response.write_u32_be(0);
                query.response.write_u16(0);
            }
        }
    }
    query
        .response
        .write_u16((account.premium_days + account.pending_premium_days) as u16);
    query.finish_response();
    Ok(())
}

pub async fn login_account(
    db: &mut DatabaseSession,
    hosts: &SharedHostCache,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let account_id = request.read_u32() as i32;
    let password = request.read_string(30);
    let ip_text = request.read_string(16);

    let Some(ip_address) = parse_ip(&ip_text) else {
        query.failed();
        return Ok(());
    };

    let result = login_account_tx(db, hosts, query, account_id, &password, ip_address).await;
    record_login_attempt(db, query, account_id, ip_address).await;
    result
}

#[allow(clippy::too_many_arguments, clippy::too_many_lines)]
async fn login_game_tx(
    db: &mut DatabaseSession,
    query: &mut Query,
    account_id: i32,
    character_name: &str,
    password: &str,
    ip_address: u32,
    private_world: bool,
    gamemaster_required: bool,
) -> Result<(), QueryManagerError> {
    let mut tx = TransactionScope::new("LoginGame");
    tx.begin(db).await?;

    let character = store::characters::character_login_data(db, character_name).await?;
    let Some(character) = character else {
        tx.rollback(db).await?;
        query.error(1);
        return Ok(());
    };
    if character.deleted {
        tx.rollback(db).await?;
        query.error(2);
        return Ok(());
    }
    if character.world_id != query.world_id {
        tx.rollback(db).await?;
        query.error(3);
        return Ok(());
    }
    if private_world {
        let invited =
            store::characters::world_invitation(db, query.world_id, character.character_id)
                .await?;
        if !invited {
            tx.rollback(db).await?;
            query.error(4);
            return Ok(());
        }
    }

    let account = store::accounts::account_data(db, account_id).await?;
    let Some(mut account) = account else {
        tx.rollback(db).await?;
        query.error(15);
        return Ok(());
    };
    if account.account_id != character.account_id {
        tx.rollback(db).await?;
        query.error(15);
        return Ok(());
    }
    if account.deleted {
        tx.rollback(db).await?;
        query.error(8);
        return Ok(());
    }
    if !verify_password(&account.auth, password) {
        tx.rollback(db).await?;
        query.error(6);
        return Ok(());
    }

    let failed =
        store::accounts::account_failed_login_attempts(db, account_id, ACCOUNT_ATTEMPT_WINDOW)
            .await?;
    if failed > ACCOUNT_ATTEMPT_LIMIT {
        tx.rollback(db).await?;
        query.error(7);
        return Ok(());
    }
    let failed =
        store::accounts::ip_failed_login_attempts(db, ip_address, IP_ATTEMPT_WINDOW).await?;
    if failed > IP_ATTEMPT_LIMIT {
        tx.rollback(db).await?;
        query.error(9);
        return Ok(());
    }

    if store::banishments::is_account_banished(db, account_id).await? {
        tx.rollback(db).await?;
        query.error(10);
        return Ok(());
    }
    if store::banishments::is_character_namelocked(db, character.character_id).await? {
        tx.rollback(db).await?;
        query.error(11);
        return Ok(());
    }
    if store::banishments::is_ip_banished(db, ip_address).await? {
        tx.rollback(db).await?;
        query.error(12);
        return Ok(());
    }

    let multiclient =
        store::characters::character_right(db, character.character_id, "ALLOW_MULTICLIENT")
            .await?;
    if !multiclient {
        let online_characters =
            store::accounts::account_online_characters(db, account_id).await?;
        if online_characters > 0 {
            let already_online =
                store::characters::is_character_online(db, character.character_id).await?;
            if !already_online {
                tx.rollback(db).await?;
                query.error(13);
                return Ok(());
            }
        }
    }

    if gamemaster_required {
        let gamemaster =
            store::characters::character_right(db, character.character_id, "GAMEMASTER_OUTFIT")
                .await?;
        if !gamemaster {
            tx.rollback(db).await?;
            query.error(14);
            return Ok(());
        }
    }

    let buddies = store::characters::buddies(db, query.world_id, account_id).await?;
    let mut rights = store::characters::character_rights(db, character.character_id).await?;

    let mut premium_activated = false;
    if account.premium_days == 0 && account.pending_premium_days > 0 {
        store::accounts::activate_pending_premium_days(db, account_id).await?;
        account.premium_days += account.pending_premium_days;
        account.pending_premium_days = 0;
        premium_activated = true;
    }
    if account.premium_days > 0 {
        rights.push("PREMIUM_ACCOUNT".to_string());
    }

    store::characters::increment_is_online(db, query.world_id, character.character_id).await?;
    tx.commit(db).await?;

    query.begin_response(QueryStatus::Ok);
    query.response.write_u32(character.character_id as u32);
    query.response.write_string(&character.name);
    query.response.write_u8(character.sex as u8);
    query.response.write_string(&character.guild);
    query.response.write_string(&character.rank);
    query.response.write_string(&character.title);

    let buddy_count = buddies.len().min(u8::MAX as usize);
    query.response.write_u8(buddy_count as u8);
    for buddy in &buddies[..buddy_count] {
        query.response.write_u32(buddy.character_id as u32);
        query.response.write_string(&buddy.name);
    }

    let right_count = rights.len().min(u8::MAX as usize);
    query.response.write_u8(right_count as u8);
    for right in &rights[..right_count] {
        query.response.write_string(right);
    }

    query.response.write_flag(premium_activated);
    query.finish_response();
    Ok(())
}

pub async fn login_game(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let account_id = request.read_u32() as i32;
    let character_name = request.read_string(30);
    let password = request.read_string(30);
    let ip_text = request.read_string(16);
    let private_world = request.read_flag();
    request.read_flag(); // premium requirement is enforced world-side
    let gamemaster_required = request.read_flag();

    let Some(ip_address) = parse_ip(&ip_text) else {
        query.failed();
        return Ok(());
    };

    let result = login_game_tx(
        db,
        query,
        account_id,
        &character_name,
        password.as_str(),
        ip_address,
        private_world,
        gamemaster_required,
    )
    .await;
    record_login_attempt(db, query, account_id, ip_address).await;
    result
}

/// Record the attempt whenever the operation settled; a PENDING outcome
/// is about to be retried and records nothing. Recording failures do
/// not change the settled outcome.
async fn record_login_attempt(
    db: &mut DatabaseSession,
    query: &Query,
    account_id: i32,
    ip_address: u32,
) {
    if query.status == QueryStatus::Pending {
        return;
    }
    let failed = query.status != QueryStatus::Ok;
    if let Err(e) = store::accounts::insert_login_attempt(db, account_id, ip_address, failed).await
    {
        warn!("failed to record login attempt for account {account_id}: {e}");
    }
}

pub async fn logout_game(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let character_id = request.read_u32() as i32;
    let level = i32::from(request.read_u16());
    let profession = request.read_string(30);
    let residence = request.read_string(30);
    let last_login_time = request.read_u32() as i32;
    let tutor_activities = i32::from(request.read_u16());

    store::characters::logout_character(
        db,
        query.world_id,
        character_id,
        level,
        &profession,
        &residence,
        last_login_time,
        tutor_activities,
    )
    .await?;
    query.ok();
    Ok(())
}
