use callboard_api_types::{
    AnalysisRequest, CallRecord, Catalog, DynamicsKind, DynamicsPoint, Envelope, Manager,
    ManagerCreateRequest, ManagerEditRequest, ManagerView, Range,
};

use super::namespaces::{ManagerCalls, ManagerDetails, ManagerDynamics, ManagersCatalog};
use super::{Ack, ApiRequest, Dashboard, LONG_STALE_TIME, SHORT_STALE_TIME, keys};
use crate::query::{MutationOptions, QueryOptions};

impl Dashboard {
    pub fn managers(
        &self,
        page: u32,
        per_page: u32,
        search: &str,
    ) -> QueryOptions<Envelope<Catalog<Manager>>> {
        let request = ApiRequest::get("/managers/catalog")
            .param("page", page)
            .param("per_page", per_page)
            .param("search", search);
        self.fetch::<ManagersCatalog>(keys::managers(page, per_page, search), request)
    }

    /// Profile, totals and rejects of one manager. Disabled for id 0.
    pub fn manager_view(&self, id: u64, range: Range) -> QueryOptions<Envelope<ManagerView>> {
        let request = ApiRequest::get(format!("/managers/view/{id}")).param("range", range.as_str());
        self.fetch::<ManagerDetails>(keys::manager_view(id, range), request)
            .stale_time(LONG_STALE_TIME)
            .enabled(id != 0)
    }

    pub fn manager_dynamics(
        &self,
        id: u64,
        range: Range,
        kind: DynamicsKind,
    ) -> QueryOptions<Envelope<Vec<DynamicsPoint>>> {
        let request = ApiRequest::get(format!("/managers/dynamics/{id}"))
            .param("range", range.as_str())
            .param("type", kind.as_str());
        self.fetch::<ManagerDynamics>(keys::manager_dynamics(id, range, kind), request)
            .stale_time(LONG_STALE_TIME)
            .enabled(id != 0)
    }

    pub fn manager_calls(
        &self,
        id: u64,
        page: u32,
        per_page: u32,
        search: &str,
    ) -> QueryOptions<Envelope<Catalog<CallRecord>>> {
        let request = ApiRequest::get(format!("/managers/calls/{id}"))
            .param("page", page)
            .param("per_page", per_page)
            .param("search", search);
        self.fetch::<ManagerCalls>(keys::manager_calls(id, page, per_page, search), request)
            .stale_time(SHORT_STALE_TIME)
            .enabled(id != 0)
    }

    pub fn create_manager(&self) -> MutationOptions<ManagerCreateRequest, Ack> {
        self.write(vec![keys::managers_root()], |body: ManagerCreateRequest| {
            ApiRequest::post("/managers/create").json(&body)
        })
    }

    pub fn edit_manager(&self) -> MutationOptions<(u64, ManagerEditRequest), Ack> {
        self.write(
            vec![keys::managers_root()],
            |(id, body): (u64, ManagerEditRequest)| {
                ApiRequest::post(format!("/managers/edit/{id}")).json(&body)
            },
        )
    }

    pub fn delete_manager_photo(&self) -> MutationOptions<u64, Ack> {
        self.write(vec![keys::managers_root()], |id: u64| {
            Ok(ApiRequest::delete(format!("/managers/delete_photo/{id}")))
        })
    }

    /// Submits a recording for AI analysis; managers and calls change once it lands.
    pub fn analyze_call(&self) -> MutationOptions<AnalysisRequest, Ack> {
        self.write(
            vec![keys::managers_root(), keys::calls_root()],
            |body: AnalysisRequest| ApiRequest::post("/managers/ai").json(&body),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::query::{QueryClient, QueryConfig, QueryStatus};
    use crate::resources::testing::StubApi;

    fn catalog(total: u64) -> serde_json::Value {
        json!({
            "status": true,
            "message": "",
            "data": {
                "items": [{ "id": 1, "name": "Iryna" }],
                "pagination": { "total": total, "page": 1, "per_page": 10, "total_pages": 1 }
            }
        })
    }

    #[tokio::test]
    async fn catalog_query_sends_paging_params() {
        let api = Arc::new(StubApi::default());
        api.respond("/managers/catalog", Ok(catalog(42)));
        let dashboard = Dashboard::new(QueryClient::new(QueryConfig::default()), api.clone());

        let query = dashboard.client().query(dashboard.managers(2, 25, "ko"));
        let body = query.settled().await.expect("catalog");

        assert_eq!(body.data.pagination.total, 42);
        let requests = api.requests_to("/managers/catalog");
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].params,
            vec![
                ("page", "2".to_string()),
                ("per_page", "25".to_string()),
                ("search", "ko".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn view_for_unknown_manager_stays_idle() {
        let api = Arc::new(StubApi::default());
        let dashboard = Dashboard::new(QueryClient::new(QueryConfig::default()), api.clone());

        let query = dashboard.client().query(dashboard.manager_view(0, Range::All));

        assert!(!query.is_enabled());
        assert_eq!(query.status(), QueryStatus::Idle);
        assert!(api.requests.lock().expect("requests lock").is_empty());
    }

    #[tokio::test]
    async fn ai_analysis_invalidates_managers_and_calls() {
        let api = Arc::new(StubApi::default());
        api.respond("/managers/ai", Ok(json!({ "status": true, "message": "queued" })));
        let dashboard = Dashboard::new(QueryClient::new(QueryConfig::default()), api.clone());

        let mutation = dashboard.client().mutation(dashboard.analyze_call());
        let ack = mutation
            .mutate_async(AnalysisRequest {
                id_crm: "77".to_string(),
                manager_id: "3".to_string(),
                client_phone: "+380501112233".to_string(),
                file_name: "call.mp3".to_string(),
            })
            .await
            .expect("accepted");

        assert_eq!(ack.message, "queued");
        assert_eq!(mutation.invalidates(), &[keys::managers_root(), keys::calls_root()]);
        let sent = api.requests_to("/managers/ai");
        assert_eq!(sent[0].body.as_ref().and_then(|b| b.get("file_name")), Some(&json!("call.mp3")));
    }
}
