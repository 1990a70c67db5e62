//! Live dashboard widgets. All of them poll while observed.

use callboard_api_types::{
    DashboardKpi, DynamicsKind, DynamicsPoint, Envelope, ManagerRating, Range, RejectsReport,
};

use super::namespaces::{DashboardDynamics, DashboardMain, DashboardRatings, DashboardRejects};
use super::{ApiRequest, Dashboard, LONG_STALE_TIME, POLL_INTERVAL, keys};
use crate::query::{Namespace, QueryKey, QueryOptions};

impl Dashboard {
    pub fn dashboard_main(&self) -> QueryOptions<Envelope<DashboardKpi>> {
        self.widget::<DashboardMain>(keys::dashboard_main(), ApiRequest::get("/dashboard/main"))
    }

    pub fn dashboard_dynamics(
        &self,
        range: Range,
        kind: DynamicsKind,
    ) -> QueryOptions<Envelope<Vec<DynamicsPoint>>> {
        let request = ApiRequest::get("/dashboard/dynamics")
            .param("range", range.as_str())
            .param("type", kind.as_str());
        self.widget::<DashboardDynamics>(keys::dashboard_dynamics(range, kind), request)
    }

    pub fn dashboard_rejects(&self, range: Range) -> QueryOptions<Envelope<RejectsReport>> {
        let request = ApiRequest::get("/dashboard/rejects").param("range", range.as_str());
        self.widget::<DashboardRejects>(keys::dashboard_rejects(range), request)
    }

    pub fn dashboard_best(&self, range: Range) -> QueryOptions<Envelope<Vec<ManagerRating>>> {
        let request = ApiRequest::get("/dashboard/best").param("range", range.as_str());
        self.widget::<DashboardRatings>(keys::dashboard_best(range), request)
    }

    pub fn dashboard_worst(&self, range: Range) -> QueryOptions<Envelope<Vec<ManagerRating>>> {
        let request = ApiRequest::get("/dashboard/worst").param("range", range.as_str());
        self.widget::<DashboardRatings>(keys::dashboard_worst(range), request)
    }

    pub(super) fn widget<N: Namespace>(
        &self,
        key: QueryKey,
        request: ApiRequest,
    ) -> QueryOptions<N::Response> {
        self.fetch::<N>(key, request)
            .stale_time(LONG_STALE_TIME)
            .refetch_interval(POLL_INTERVAL)
    }
}
