//! Declared response types of every dashboard query.

use callboard_api_types::{
    Admin, CallComments, CallRecord, CallTranscript, CallView, Catalog, DashboardKpi,
    DynamicsPoint, Envelope, Manager, ManagerRating, ManagerView, ProcessCatalog,
    ProcessStatistics, RejectsReport, Setting,
};

use super::keys;
use crate::query::{Namespace, QueryError};

/// Rejects envelopes the backend flagged as failed.
fn accepted<T>(name: &str, envelope: &Envelope<T>) -> Result<(), QueryError> {
    if envelope.status {
        return Ok(());
    }
    let message = if envelope.message.is_empty() {
        "request was not accepted"
    } else {
        envelope.message.as_str()
    };
    Err(QueryError::decode(format!("{name}: {message}")))
}

macro_rules! namespace {
    ($(#[$meta:meta])* $name:ident, $root:expr, $data:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl Namespace for $name {
            const NAME: &'static str = $root;
            type Response = Envelope<$data>;

            fn validate(response: &Self::Response) -> Result<(), QueryError> {
                accepted(Self::NAME, response)
            }
        }
    };
}

namespace!(ManagersCatalog, keys::MANAGERS, Catalog<Manager>);
namespace!(ManagerDetails, keys::MANAGERS, ManagerView);
namespace!(ManagerDynamics, keys::MANAGERS, Vec<DynamicsPoint>);
namespace!(ManagerCalls, keys::MANAGERS, Catalog<CallRecord>);
namespace!(
    /// Managers catalog used as a select source.
    ManagersDropdown,
    keys::MANAGERS,
    Catalog<Manager>
);
namespace!(CallsCatalog, keys::CALLS, Catalog<CallRecord>);
namespace!(CallDetails, keys::CALL, CallView);
namespace!(CallTranscripts, keys::CALL, CallTranscript);
namespace!(CallCommentList, keys::CALL, CallComments);
namespace!(AdminsCatalog, keys::ADMINS, Catalog<Admin>);
namespace!(SettingsCatalog, keys::SETTINGS, Catalog<Setting>);
namespace!(DashboardMain, keys::DASHBOARD, DashboardKpi);
namespace!(DashboardDynamics, keys::DASHBOARD, Vec<DynamicsPoint>);
namespace!(DashboardRejects, keys::DASHBOARD, RejectsReport);
namespace!(
    /// Best and worst manager ratings share one shape.
    DashboardRatings,
    keys::DASHBOARD,
    Vec<ManagerRating>
);
namespace!(ProcessStats, keys::PROCESSES, ProcessStatistics);
namespace!(ProcessesCatalog, keys::PROCESSES, ProcessCatalog);
