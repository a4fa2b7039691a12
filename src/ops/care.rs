use crate::cache::QueryKey;
use crate::client::PlantMateClient;
use crate::error::ApiError;
use crate::models::{CareTask, NewOwnedPlant, OwnedPlant};

/// Both care actions touch the owned-plant list and the task schedule, so
/// they invalidate the same pair of keys.
const CARE_AFFECTED: [QueryKey; 2] = [QueryKey::MyPlants, QueryKey::UpcomingTasks];

impl PlantMateClient {
    /// The user's owned plants. Requires a signed-in session; resolves to
    /// `Ok(None)` (entry idle) otherwise.
    pub async fn my_plants(&self) -> Result<Option<Vec<OwnedPlant>>, ApiError> {
        let api = self.api();
        let entry = self
            .cache()
            .get_or_fetch(QueryKey::MyPlants, move || {
                let api = api.clone();
                async move { api.get::<Vec<OwnedPlant>>("/my-plants").await }
            })
            .await;
        self.guard(entry.decode()).await
    }

    /// Upcoming watering/fertilizing tasks. Requires a signed-in session.
    pub async fn upcoming_tasks(&self) -> Result<Option<Vec<CareTask>>, ApiError> {
        let api = self.api();
        let entry = self
            .cache()
            .get_or_fetch(QueryKey::UpcomingTasks, move || {
                let api = api.clone();
                async move { api.get::<Vec<CareTask>>("/plant-care/upcoming-tasks").await }
            })
            .await;
        self.guard(entry.decode()).await
    }

    /// Add a catalog plant to the user's collection.
    pub async fn add_plant(&self, new_plant: &NewOwnedPlant) -> Result<OwnedPlant, ApiError> {
        if new_plant.plant_id.trim().is_empty() {
            return Err(ApiError::Validation("A plant must be selected.".to_string()));
        }

        let api = self.api();
        let body = new_plant.clone();
        let identity = format!("add-my-plant:{}", new_plant.plant_id);
        let result = self
            .mutations()
            .run_invalidating(&identity, &CARE_AFFECTED, async move {
                api.post::<OwnedPlant, _>("/my-plants", &body).await
            })
            .await;
        self.guard(result).await
    }

    /// Remove an owned plant. The identity keys on the plant id, so a
    /// double-tap issues exactly one DELETE.
    pub async fn remove_plant(&self, my_plant_id: &str) -> Result<(), ApiError> {
        let api = self.api();
        let path = format!("/my-plants/{}", my_plant_id);
        let identity = format!("remove-my-plant:{}", my_plant_id);
        let result = self
            .mutations()
            .run_invalidating(&identity, &CARE_AFFECTED, async move {
                api.delete_unit(&path).await
            })
            .await;
        self.guard(result).await
    }

    /// Record a watering. Returns the updated owned plant.
    pub async fn water_plant(&self, my_plant_id: &str) -> Result<OwnedPlant, ApiError> {
        self.care_action("water", my_plant_id).await
    }

    /// Record a fertilizing. Returns the updated owned plant.
    pub async fn fertilize_plant(&self, my_plant_id: &str) -> Result<OwnedPlant, ApiError> {
        self.care_action("fertilize", my_plant_id).await
    }

    async fn care_action(&self, action: &str, my_plant_id: &str) -> Result<OwnedPlant, ApiError> {
        let api = self.api();
        let path = format!("/plant-care/{}/{}", action, my_plant_id);
        let identity = format!("{}:{}", action, my_plant_id);
        let result = self
            .mutations()
            .run_invalidating(&identity, &CARE_AFFECTED, async move {
                api.post::<OwnedPlant, _>(&path, &serde_json::json!({})).await
            })
            .await;
        self.guard(result).await
    }
}
