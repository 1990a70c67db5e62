use callboard_api_types::{
    AddCommentRequest, CallComments, CallRecord, CallTranscript, CallView, Catalog, Envelope,
    Manager, ManagerOption,
};

use super::keys::{self, CallFilter};
use super::namespaces::{
    CallCommentList, CallDetails, CallTranscripts, CallsCatalog, ManagersDropdown,
};
use super::{Ack, ApiRequest, Dashboard, LONG_STALE_TIME, SHORT_STALE_TIME};
use crate::query::{MutationOptions, QueryOptions};

const DROPDOWN_PAGE_SIZE: u32 = 100;

impl Dashboard {
    /// Calls catalog. Filter fields left unset are not sent.
    pub fn calls(&self, filter: &CallFilter) -> QueryOptions<Envelope<Catalog<CallRecord>>> {
        let request = ApiRequest::get("/calls/catalog")
            .param("page", filter.page)
            .param("per_page", filter.per_page)
            .param_opt(
                "search",
                Some(filter.search.as_str()).filter(|search| !search.is_empty()),
            )
            .param_opt("manager_id", filter.manager_id)
            .param_opt("is_checked", filter.is_checked)
            .param_opt("ai_score", filter.ai_score.as_deref())
            .param_opt("reject_reason", filter.reject_reason.as_deref())
            .param_opt("status", filter.status.as_deref());
        self.fetch::<CallsCatalog>(keys::calls(filter), request)
            .stale_time(SHORT_STALE_TIME)
            .keep_previous_data(true)
    }

    /// First page of managers matching `search`, for filter selects.
    pub fn managers_dropdown(&self, search: &str) -> QueryOptions<Envelope<Catalog<Manager>>> {
        let request = ApiRequest::get("/managers/catalog")
            .param("page", 1)
            .param("per_page", DROPDOWN_PAGE_SIZE)
            .param("search", search);
        self.fetch::<ManagersDropdown>(keys::managers_dropdown(search), request)
            .stale_time(LONG_STALE_TIME)
            .keep_previous_data(true)
    }

    pub fn call_view(&self, id: u64) -> QueryOptions<Envelope<CallView>> {
        self.fetch::<CallDetails>(
            keys::call_view(id),
            ApiRequest::get(format!("/calls/view/{id}")),
        )
        .stale_time(SHORT_STALE_TIME)
        .enabled(id != 0)
    }

    pub fn call_transcript(&self, id: u64) -> QueryOptions<Envelope<CallTranscript>> {
        self.fetch::<CallTranscripts>(
            keys::call_transcript(id),
            ApiRequest::get(format!("/calls/transcript/{id}")),
        )
        .stale_time(LONG_STALE_TIME)
        .enabled(id != 0)
    }

    pub fn call_comments(&self, id: u64) -> QueryOptions<Envelope<CallComments>> {
        self.fetch::<CallCommentList>(
            keys::call_comments(id),
            ApiRequest::get(format!("/calls/comments/{id}")),
        )
        .stale_time(SHORT_STALE_TIME)
        .enabled(id != 0)
    }

    /// Marks a call as reviewed; refreshes the open call and every calls list.
    pub fn check_call(&self, id: u64) -> MutationOptions<u64, Ack> {
        self.write(vec![keys::call_view(id), keys::calls_root()], |call_id: u64| {
            Ok(ApiRequest::post(format!("/calls/check/{call_id}")))
        })
    }

    pub fn add_comment(&self, id: u64) -> MutationOptions<AddCommentRequest, Ack> {
        self.write(vec![keys::call_comments(id)], move |body: AddCommentRequest| {
            ApiRequest::post(format!("/calls/add_comment/{id}")).json(&body)
        })
    }
}

/// Select options built from a dropdown catalog.
pub fn dropdown_options(catalog: &Catalog<Manager>) -> Vec<ManagerOption> {
    catalog
        .items
        .iter()
        .map(|manager| ManagerOption {
            id: manager.id,
            name: manager.name.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::query::{QueryClient, QueryConfig};
    use crate::resources::testing::StubApi;

    #[tokio::test]
    async fn catalog_omits_unset_filters() {
        let api = Arc::new(StubApi::default());
        api.respond(
            "/calls/catalog",
            Ok(json!({
                "status": true,
                "data": {
                    "items": [],
                    "pagination": { "total": 0, "page": 1, "per_page": 10, "total_pages": 0 }
                }
            })),
        );
        let dashboard = Dashboard::new(QueryClient::new(QueryConfig::default()), api.clone());
        let filter = CallFilter {
            is_checked: Some(0),
            ..Default::default()
        };

        let query = dashboard.client().query(dashboard.calls(&filter));
        query.settled().await.expect("catalog");

        let sent = api.requests_to("/calls/catalog");
        assert_eq!(
            sent[0].params,
            vec![
                ("page", "1".to_string()),
                ("per_page", "10".to_string()),
                ("is_checked", "0".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn check_call_invalidates_view_and_lists() {
        let dashboard = Dashboard::new(
            QueryClient::new(QueryConfig::default()),
            Arc::new(StubApi::default()),
        );
        let mutation = dashboard.client().mutation(dashboard.check_call(5));
        assert_eq!(
            mutation.invalidates(),
            &[keys::call_view(5), keys::calls_root()]
        );
    }

    #[test]
    fn dropdown_maps_to_options() {
        let catalog: Catalog<Manager> = serde_json::from_value(json!({
            "items": [{ "id": 4, "name": "Taras" }],
            "pagination": { "total": 1, "page": 1, "per_page": 100, "total_pages": 1 }
        }))
        .expect("catalog");

        assert_eq!(
            dropdown_options(&catalog),
            vec![ManagerOption {
                id: 4,
                name: "Taras".to_string()
            }]
        );
    }
}
