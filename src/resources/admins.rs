use callboard_api_types::{Admin, AdminCreateRequest, AdminEditRequest, Catalog, Envelope};

use super::namespaces::AdminsCatalog;
use super::{Ack, ApiRequest, Dashboard, keys};
use crate::query::{MutationOptions, QueryOptions};

impl Dashboard {
    pub fn admins(
        &self,
        page: u32,
        per_page: u32,
        search: &str,
    ) -> QueryOptions<Envelope<Catalog<Admin>>> {
        let request = ApiRequest::get("/admins/catalog")
            .param("page", page)
            .param("per_page", per_page)
            .param("search", search);
        self.fetch::<AdminsCatalog>(keys::admins(page, per_page, search), request)
    }

    pub fn create_admin(&self) -> MutationOptions<AdminCreateRequest, Ack> {
        self.write(vec![keys::admins_root()], |body: AdminCreateRequest| {
            ApiRequest::post("/admins/create").json(&body)
        })
    }

    pub fn edit_admin(&self) -> MutationOptions<(u64, AdminEditRequest), Ack> {
        self.write(
            vec![keys::admins_root()],
            |(id, body): (u64, AdminEditRequest)| {
                ApiRequest::post(format!("/admins/edit/{id}")).json(&body)
            },
        )
    }

    pub fn delete_admin(&self) -> MutationOptions<u64, Ack> {
        self.write(vec![keys::admins_root()], |id: u64| {
            Ok(ApiRequest::delete(format!("/admins/delete/{id}")))
        })
    }

    pub fn delete_admin_photo(&self) -> MutationOptions<u64, Ack> {
        self.write(vec![keys::admins_root()], |id: u64| {
            Ok(ApiRequest::delete(format!("/admins/delete_photo/{id}")))
        })
    }
}
