//! Paged read cursor over a built plan

use std::collections::VecDeque;

use crate::model::{Tuple, ViewSchema};
use crate::store::ScanSpec;

use super::errors::PlannerResult;
use super::explain::ExplainPlan;
use super::plan::QueryPlan;

const PAGE_SIZE: usize = 1024;

/// Yields the plan's result rows in timestamp order
///
/// The plan is closed as soon as the last row has been handed out, when a
/// read fails, or on [`PlanCursor::close`].
#[derive(Debug)]
pub struct PlanCursor {
    plan: QueryPlan,
    scan: ScanSpec,
    buffer: VecDeque<Tuple>,
    fetched: usize,
    exhausted: bool,
    page_size: usize,
}

impl PlanCursor {
    pub(crate) fn new(plan: QueryPlan, scan: ScanSpec) -> Self {
        Self {
            plan,
            scan,
            buffer: VecDeque::new(),
            fetched: 0,
            exhausted: false,
            page_size: PAGE_SIZE,
        }
    }

    /// Rows fetched from the store per read
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn schema(&self) -> &ViewSchema {
        self.plan.output_schema()
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn explain(&self) -> ExplainPlan {
        ExplainPlan::from_plan(&self.plan)
    }

    pub async fn next(&mut self) -> PlannerResult<Option<Tuple>> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Ok(Some(row));
            }
            if self.exhausted || self.plan.is_closed() {
                self.plan.close().await?;
                return Ok(None);
            }
            if let Err(err) = self.fetch().await {
                self.exhausted = true;
                // release failures are logged by close()
                let _ = self.plan.close().await;
                return Err(err);
            }
        }
    }

    /// Drains the cursor
    pub async fn collect_all(mut self) -> PlannerResult<Vec<Tuple>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Stops reading and releases the plan's views
    pub async fn close(mut self) -> PlannerResult<()> {
        self.buffer.clear();
        self.exhausted = true;
        self.plan.close().await
    }

    async fn fetch(&mut self) -> PlannerResult<()> {
        let remaining = self
            .scan
            .limit
            .map_or(usize::MAX, |limit| limit.saturating_sub(self.fetched));
        let want = self.page_size.min(remaining);
        if want == 0 {
            self.exhausted = true;
            return Ok(());
        }

        let page = self
            .scan
            .clone()
            .with_page(self.scan.offset + self.fetched, Some(want));
        let rows = self.plan.read(&page).await?;
        if rows.len() < want {
            self.exhausted = true;
        }
        self.fetched += rows.len();
        self.buffer.extend(rows);
        Ok(())
    }
}
