use callboard_api_types::{Catalog, Envelope, Setting, SettingCreateRequest, SettingEditRequest};

use super::namespaces::SettingsCatalog;
use super::{Ack, ApiRequest, Dashboard, keys};
use crate::query::{MutationOptions, QueryOptions};

impl Dashboard {
    /// Prompt settings per CRM status.
    pub fn settings(&self, page: u32, per_page: u32) -> QueryOptions<Envelope<Catalog<Setting>>> {
        let request = ApiRequest::get("/settings/catalog")
            .param("page", page)
            .param("per_page", per_page);
        self.fetch::<SettingsCatalog>(keys::settings(page, per_page), request)
    }

    pub fn create_setting(&self) -> MutationOptions<SettingCreateRequest, Ack> {
        self.write(vec![keys::settings_root()], |body: SettingCreateRequest| {
            ApiRequest::post("/settings/create").json(&body)
        })
    }

    pub fn edit_setting(&self) -> MutationOptions<(u64, SettingEditRequest), Ack> {
        self.write(
            vec![keys::settings_root()],
            |(id, body): (u64, SettingEditRequest)| {
                ApiRequest::post(format!("/settings/edit/{id}")).json(&body)
            },
        )
    }

    /// Enables or disables a setting.
    pub fn toggle_setting(&self) -> MutationOptions<u64, Ack> {
        self.write(vec![keys::settings_root()], |id: u64| {
            Ok(ApiRequest::post(format!("/settings/switch/{id}")))
        })
    }
}
