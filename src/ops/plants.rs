use crate::cache::QueryKey;
use crate::client::PlantMateClient;
use crate::error::ApiError;
use crate::models::{Disease, Plant};

impl PlantMateClient {
    /// The browsable plant catalog. Public; served from cache when fresh.
    pub async fn plants(&self) -> Result<Option<Vec<Plant>>, ApiError> {
        let api = self.api();
        let entry = self
            .cache()
            .get_or_fetch(QueryKey::Plants, move || {
                let api = api.clone();
                async move { api.get::<Vec<Plant>>("/plants").await }
            })
            .await;
        self.guard(entry.decode()).await
    }

    /// One catalog plant by id.
    pub async fn plant(&self, id: &str) -> Result<Option<Plant>, ApiError> {
        let api = self.api();
        let path = format!("/plants/{}", id);
        let entry = self
            .cache()
            .get_or_fetch(QueryKey::Plant(id.to_string()), move || {
                let api = api.clone();
                let path = path.clone();
                async move { api.get::<Plant>(&path).await }
            })
            .await;
        self.guard(entry.decode()).await
    }

    /// The disease catalog.
    pub async fn diseases(&self) -> Result<Option<Vec<Disease>>, ApiError> {
        let api = self.api();
        let entry = self
            .cache()
            .get_or_fetch(QueryKey::Diseases, move || {
                let api = api.clone();
                async move { api.get::<Vec<Disease>>("/diseases").await }
            })
            .await;
        self.guard(entry.decode()).await
    }
}
