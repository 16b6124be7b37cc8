//! Namelocks, banishments, notations and statement reports.

use tracing::error;

use crate::db::DatabaseSession;
use crate::error::QueryManagerError;
use crate::query::{Query, QueryStatus};
use crate::store::{self, StatementRow};
use crate::transaction::TransactionScope;

use super::{compound_banishment, parse_ip};

/// Optional address field: empty means unknown, anything else must be a
/// well-formed dotted quad.
fn parse_optional_ip(text: &str) -> Option<u32> {
    if text.is_empty() {
        Some(0)
    } else {
        parse_ip(text)
    }
}

pub async fn set_namelock(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let gamemaster_id = request.read_u32() as i32;
    let character_name = request.read_string(30);
    let ip_text = request.read_string(16);
    let reason = request.read_string(200);
    let comment = request.read_string(200);

    let Some(ip_address) = parse_optional_ip(&ip_text) else {
        query.failed();
        return Ok(());
    };

    let mut tx = TransactionScope::new("SetNamelock");
    tx.begin(db).await?;

    let character_id = store::characters::character_id(db, query.world_id, &character_name).await?;
    let Some(character_id) = character_id else {
        tx.rollback(db).await?;
        query.error(1);
        return Ok(());
    };

    if store::characters::character_right(db, character_id, "NAMELOCK").await? {
        tx.rollback(db).await?;
        query.error(2);
        return Ok(());
    }

    let status = store::banishments::namelock_status(db, character_id).await?;
    if status.namelocked {
        tx.rollback(db).await?;
        query.error(if status.approved { 4 } else { 3 });
        return Ok(());
    }

    store::banishments::insert_namelock(
        db,
        character_id,
        ip_address,
        gamemaster_id,
        &reason,
        &comment,
    )
    .await?;
    tx.commit(db).await?;
    query.ok();
    Ok(())
}

pub async fn banish_account(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let gamemaster_id = request.read_u32() as i32;
    let character_name = request.read_string(30);
    let ip_text = request.read_string(16);
    let reason = request.read_string(200);
    let comment = request.read_string(200);
    let mut final_warning = request.read_flag();

    let Some(ip_address) = parse_optional_ip(&ip_text) else {
        query.failed();
        return Ok(());
    };

    let mut tx = TransactionScope::new("BanishAccount");
    tx.begin(db).await?;

    let character_id = store::characters::character_id(db, query.world_id, &character_name).await?;
    let Some(character_id) = character_id else {
        tx.rollback(db).await?;
        query.error(1);
        return Ok(());
    };

    if store::characters::character_right(db, character_id, "BANISHMENT").await? {
        tx.rollback(db).await?;
        query.error(2);
        return Ok(());
    }

    let status = store::banishments::banishment_status(db, character_id).await?;
    if status.banished {
        tx.rollback(db).await?;
        query.error(3);
        return Ok(());
    }

    let mut days = 7;
    compound_banishment(status, &mut days, &mut final_warning);
    let banishment_id = store::banishments::insert_banishment(
        db,
        character_id,
        ip_address,
        gamemaster_id,
        &reason,
        &comment,
        final_warning,
        days * 86_400,
    )
    .await?;
    tx.commit(db).await?;

    query.begin_response(QueryStatus::Ok);
    query.response.write_u32(banishment_id as u32);
    query
        .response
        .write_u8(if days > 0 { days as u8 } else { 0xFF });
    query.response.write_flag(final_warning);
    query.finish_response();
    Ok(())
}

pub async fn set_notation(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let gamemaster_id = request.read_u32() as i32;
    let character_name = request.read_string(30);
    let ip_text = request.read_string(16);
    let reason = request.read_string(200);
    let comment = request.read_string(200);

    let Some(ip_address) = parse_optional_ip(&ip_text) else {
        query.failed();
        return Ok(());
    };

    let mut tx = TransactionScope::new("SetNotation");
    tx.begin(db).await?;

    let character_id = store::characters::character_id(db, query.world_id, &character_name).await?;
    let Some(character_id) = character_id else {
        tx.rollback(db).await?;
        query.error(1);
        return Ok(());
    };

    if store::characters::character_right(db, character_id, "NOTATION").await? {
        tx.rollback(db).await?;
        query.error(2);
        return Ok(());
    }

    // The fifth notation escalates to a banishment under the usual
    // compounding rules.
    let mut banishment_id = 0;
    let notations = store::banishments::notation_count(db, character_id).await?;
    if notations >= 5 {
        let mut days = 7;
        let mut final_warning = false;
        let status = store::banishments::banishment_status(db, character_id).await?;
        compound_banishment(status, &mut days, &mut final_warning);
        banishment_id = store::banishments::insert_banishment(
            db,
            character_id,
            ip_address,
            0,
            "Excessive Notations",
            "",
            final_warning,
            days * 86_400,
        )
        .await?;
    }

    store::banishments::insert_notation(
        db,
        character_id,
        ip_address,
        gamemaster_id,
        &reason,
        &comment,
    )
    .await?;
    tx.commit(db).await?;

    query.begin_response(QueryStatus::Ok);
    query.response.write_u32(banishment_id as u32);
    query.finish_response();
    Ok(())
}

pub async fn report_statement(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let reporter_id = request.read_u32() as i32;
    let character_name = request.read_string(30);
    let reason = request.read_string(200);
    let comment = request.read_string(200);
    let banishment_id = request.read_u32() as i32;
    let statement_id = request.read_u32() as i32;
    let statement_count = request.read_u16() as usize;

    if statement_id == 0 {
        error!("missing statement id");
        query.failed();
        return Ok(());
    }
    if statement_count == 0 {
        error!("missing statement context");
        query.failed();
        return Ok(());
    }

    let mut statements = Vec::with_capacity(statement_count);
    let mut reported: Option<usize> = None;
    for index in 0..statement_count {
        let statement = StatementRow {
            statement_id: request.read_u32() as i32,
            timestamp: request.read_u32() as i32,
            character_id: request.read_u32() as i32,
            channel: request.read_string(30),
            text: request.read_string(256),
        };
        if statement.statement_id == statement_id {
            if reported.is_some() {
                tracing::warn!(
                    "reported statement ({}, {}, {}) appears multiple times",
                    query.world_id,
                    statement.timestamp,
                    statement.statement_id
                );
            }
            reported = Some(index);
        }
        statements.push(statement);
    }

    let Some(reported) = reported else {
        error!("missing reported statement");
        query.failed();
        return Ok(());
    };

    let mut tx = TransactionScope::new("ReportStatement");
    tx.begin(db).await?;

    let character_id = store::characters::character_id(db, query.world_id, &character_name).await?;
    let Some(character_id) = character_id else {
        tx.rollback(db).await?;
        query.error(1);
        return Ok(());
    };

    if statements[reported].character_id != character_id {
        error!("reported statement character mismatch");
        tx.rollback(db).await?;
        query.failed();
        return Ok(());
    }

    if store::banishments::is_statement_reported(db, query.world_id, &statements[reported]).await? {
        tx.rollback(db).await?;
        query.error(2);
        return Ok(());
    }

    store::banishments::insert_statements(db, query.world_id, &statements).await?;
    store::banishments::insert_reported_statement(
        db,
        query.world_id,
        &statements[reported],
        banishment_id,
        reporter_id,
        &reason,
        &comment,
    )
    .await?;
    tx.commit(db).await?;
    query.ok();
    Ok(())
}

pub async fn banish_ip_address(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let gamemaster_id = i32::from(request.read_u16());
    let character_name = request.read_string(30);
    let ip_text = request.read_string(16);
    let reason = request.read_string(200);
    let comment = request.read_string(200);

    let Some(ip_address) = parse_ip(&ip_text) else {
        query.failed();
        return Ok(());
    };

    let mut tx = TransactionScope::new("BanishIP");
    tx.begin(db).await?;

    let character_id = store::characters::character_id(db, query.world_id, &character_name).await?;
    let Some(character_id) = character_id else {
        tx.rollback(db).await?;
        query.error(1);
        return Ok(());
    };

    if store::characters::character_right(db, character_id, "IP_BANISHMENT").await? {
        tx.rollback(db).await?;
        query.error(2);
        return Ok(());
    }

    // Address bans stay short: dynamically assigned or carrier-grade
    // addresses punish bystanders.
    let banishment_days = 3;
    store::banishments::insert_ip_banishment(
        db,
        character_id,
        ip_address,
        gamemaster_id,
        &reason,
        &comment,
        banishment_days * 86_400,
    )
    .await?;
    tx.commit(db).await?;
    query.ok();
    Ok(())
}
