//! Account and character management for the web front-end.

use crate::crypto::generate_auth;
use crate::db::DatabaseSession;
use crate::error::QueryManagerError;
use crate::query::{Query, QueryStatus};
use crate::store;
use crate::transaction::TransactionScope;

pub async fn create_account(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let account_id = request.read_u32() as i32;
    let email = request.read_string(100);
    let password = request.read_string(30);

    // The front-end validates inputs; anything malformed here is a
    // protocol error, not a domain one.
    if account_id <= 0 || email.is_empty() || password.is_empty() {
        query.failed();
        return Ok(());
    }

    let Ok(auth) = generate_auth(&password) else {
        query.failed();
        return Ok(());
    };

    let mut tx = TransactionScope::new("CreateAccount");
    tx.begin(db).await?;

    if store::accounts::account_number_exists(db, account_id).await? {
        tx.rollback(db).await?;
        query.error(1);
        return Ok(());
    }
    if store::accounts::account_email_exists(db, &email).await? {
        tx.rollback(db).await?;
        query.error(2);
        return Ok(());
    }

    store::accounts::create_account(db, account_id, &email, &auth).await?;
    tx.commit(db).await?;
    query.ok();
    Ok(())
}

pub async fn create_character(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let world_name = request.read_string(30);
    let account_id = request.read_u32() as i32;
    let character_name = request.read_string(30);
    let sex = i32::from(request.read_u8());

    if account_id <= 0 || (sex != 1 && sex != 2) || world_name.is_empty()
        || character_name.is_empty()
    {
        query.failed();
        return Ok(());
    }

    let mut tx = TransactionScope::new("CreateCharacter");
    tx.begin(db).await?;

    let world_id = store::worlds::world_id(db, &world_name).await?;
    let Some(world_id) = world_id else {
        tx.rollback(db).await?;
        query.error(1);
        return Ok(());
    };

    if !store::accounts::account_number_exists(db, account_id).await? {
        tx.rollback(db).await?;
        query.error(2);
        return Ok(());
    }

    if store::characters::character_name_exists(db, &character_name).await? {
        tx.rollback(db).await?;
        query.error(3);
        return Ok(());
    }

    store::characters::create_character(db, world_id, account_id, &character_name, sex).await?;
    tx.commit(db).await?;
    query.ok();
    Ok(())
}

pub async fn get_account_summary(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let account_id = request.read_u32() as i32;

    if account_id <= 0 {
        query.failed();
        return Ok(());
    }

    let account = store::accounts::account_data(db, account_id).await?;
    let Some(account) = account else {
        query.failed();
        return Ok(());
    };

    let characters = store::characters::character_summaries(db, account_id).await?;

    query.begin_response(QueryStatus::Ok);
    query.response.write_string(&account.email);
    query.response.write_u16(account.premium_days as u16);
    query.response.write_u16(account.pending_premium_days as u16);
    query.response.write_flag(account.deleted);
    let count = characters.len().min(u8::MAX as usize);
    query.response.write_u8(count as u8);
    for character in &characters[..count] {
        query.response.write_string(&character.name);
        query.response.write_string(&character.world);
        query.response.write_u16(character.level as u16);
        query.response.write_string(&character.profession);
        query.response.write_flag(character.online);
        query.response.write_flag(character.deleted);
    }
    query.finish_response();
    Ok(())
}

pub async fn get_character_profile(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let character_name = request.read_string(30);

    if character_name.is_empty() {
        query.failed();
        return Ok(());
    }

    let profile = store::characters::character_profile(db, &character_name).await?;
    let Some(profile) = profile else {
        query.error(1);
        return Ok(());
    };
    if !profile.name.eq_ignore_ascii_case(&character_name) {
        query.error(1);
        return Ok(());
    }

    query.begin_response(QueryStatus::Ok);
    query.response.write_string(&profile.name);
    query.response.write_string(&profile.world);
    query.response.write_u8(profile.sex as u8);
    query.response.write_string(&profile.guild);
    query.response.write_string(&profile.rank);
    query.response.write_string(&profile.title);
    query.response.write_u16(profile.level as u16);
    query.response.write_string(&profile.profession);
    query.response.write_string(&profile.residence);
    query.response.write_u32(profile.last_login as u32);
    query.response.write_u16(profile.premium_days as u16);
    query.response.write_flag(profile.online);
    query.response.write_flag(profile.deleted);
    query.finish_response();
    Ok(())
}
