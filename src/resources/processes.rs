use callboard_api_types::{Envelope, ProcessCatalog, ProcessStatistics};

use super::keys::{self, ProcessFilter, normalize_date};
use super::namespaces::{ProcessStats, ProcessesCatalog};
use super::{ApiRequest, Dashboard, SHORT_STALE_TIME};
use crate::query::QueryOptions;

const ANY: &str = "all";

impl Dashboard {
    /// Pipeline counters; polls like the dashboard widgets.
    pub fn process_statistics(&self) -> QueryOptions<Envelope<ProcessStatistics>> {
        self.widget::<ProcessStats>(
            keys::process_statistics(),
            ApiRequest::get("/processes/statistic"),
        )
    }

    /// Processing tasks. `all` stage or status and empty fields are not sent.
    pub fn processes(&self, filter: &ProcessFilter) -> QueryOptions<Envelope<ProcessCatalog>> {
        let date_from = normalize_date(&filter.date_from);
        let date_to = normalize_date(&filter.date_to);
        let request = ApiRequest::get("/processes/catalog")
            .param("page", filter.page)
            .param("per_page", filter.per_page)
            .param_opt("search", non_empty(&filter.search))
            .param_opt("stage", non_empty(&filter.stage).filter(|stage| *stage != ANY))
            .param_opt("status", non_empty(&filter.status).filter(|status| *status != ANY))
            .param_opt("date_from", non_empty(&date_from))
            .param_opt("date_to", non_empty(&date_to));
        self.fetch::<ProcessesCatalog>(keys::processes(filter), request)
            .stale_time(SHORT_STALE_TIME)
            .keep_previous_data(true)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|value| !value.is_empty())
}
