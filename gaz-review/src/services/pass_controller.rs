//! Review Pass Controller
//!
//! Per (dataset, authority), hits are reviewed pass by pass:
//! `pass0 → pass1 → pass2 → pass3 → done`. A pass is finished when none of
//! its records has workable hits. The `deferred` queue sits beside the
//! sequence and is only drained when a reviewer asks for it.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::{self, review_status::StatusTotals};
use crate::error::{ReviewError, ReviewResult};
use crate::models::{Authority, Hit, Pass, Record};

/// A record and its workable hits in one pass
#[derive(Debug, Clone, Serialize)]
pub struct ReviewUnit {
    pub record: Record,
    pub pass: Pass,
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NextUnit {
    Record(ReviewUnit),
    /// Requested pass is empty; `next` is where work remains
    PassExhausted { next: Option<Pass> },
    /// Nothing left anywhere, deferred queue included
    NoWork,
}

/// Position in the pass sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassPosition {
    Pass(Pass),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassCount {
    pub pass: Pass,
    pub records_remaining: i64,
    pub hits_remaining: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassProgress {
    pub dataset_id: i64,
    pub authority: Authority,
    pub current: PassPosition,
    pub passes: Vec<PassCount>,
    pub deferred: PassCount,
    pub statuses: StatusTotals,
}

pub struct PassController {
    db: SqlitePool,
}

impl PassController {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Next record to review in `pass`, lowest record id first
    pub async fn next_unit(
        &self,
        dataset_id: i64,
        authority: &Authority,
        pass: Pass,
    ) -> ReviewResult<NextUnit> {
        if let Some(record_id) =
            db::hits::next_record_in_pass(&self.db, dataset_id, authority, pass).await?
        {
            let mut conn = self.db.acquire().await?;
            let record = db::records::get_record(&mut conn, record_id)
                .await?
                .ok_or_else(|| ReviewError::NotFound(format!("record {}", record_id)))?;
            let hits = db::hits::unreviewed_for_pass(&mut conn, record_id, authority, pass).await?;

            return Ok(NextUnit::Record(ReviewUnit { record, pass, hits }));
        }

        match self.first_pass_with_work(dataset_id, authority).await? {
            Some(next) => Ok(NextUnit::PassExhausted { next: Some(next) }),
            None => Ok(NextUnit::NoWork),
        }
    }

    /// First of pass0..pass3 with work, else `Done`
    pub async fn current_pass(&self, dataset_id: i64, authority: &Authority) -> ReviewResult<PassPosition> {
        for pass in Pass::ORDERED {
            let (records, _) = db::hits::pass_remaining(&self.db, dataset_id, authority, pass).await?;
            if records > 0 {
                return Ok(PassPosition::Pass(pass));
            }
        }
        Ok(PassPosition::Done)
    }

    pub async fn progress(&self, dataset_id: i64, authority: &Authority) -> ReviewResult<PassProgress> {
        let mut passes = Vec::with_capacity(Pass::ORDERED.len());
        for pass in Pass::ORDERED {
            passes.push(self.count(dataset_id, authority, pass).await?);
        }
        let deferred = self.count(dataset_id, authority, Pass::Deferred).await?;

        let current = passes
            .iter()
            .find(|c| c.records_remaining > 0)
            .map(|c| PassPosition::Pass(c.pass))
            .unwrap_or(PassPosition::Done);

        let statuses = db::review_status::status_totals(&self.db, dataset_id, authority).await?;

        Ok(PassProgress {
            dataset_id,
            authority: authority.clone(),
            current,
            passes,
            deferred,
            statuses,
        })
    }

    async fn count(&self, dataset_id: i64, authority: &Authority, pass: Pass) -> ReviewResult<PassCount> {
        let (records_remaining, hits_remaining) =
            db::hits::pass_remaining(&self.db, dataset_id, authority, pass).await?;
        Ok(PassCount {
            pass,
            records_remaining,
            hits_remaining,
        })
    }

    async fn first_pass_with_work(
        &self,
        dataset_id: i64,
        authority: &Authority,
    ) -> ReviewResult<Option<Pass>> {
        if let PassPosition::Pass(pass) = self.current_pass(dataset_id, authority).await? {
            return Ok(Some(pass));
        }
        let (deferred, _) =
            db::hits::pass_remaining(&self.db, dataset_id, authority, Pass::Deferred).await?;
        Ok((deferred > 0).then_some(Pass::Deferred))
    }
}
