use serde::Serialize;

use crate::cache::QueryKey;
use crate::client::PlantMateClient;
use crate::error::ApiError;
use crate::models::{NotificationPreferences, PreferenceToggle};

#[derive(Debug, Serialize)]
struct PushTokenRequest<'a> {
    token: &'a str,
}

impl PlantMateClient {
    /// The user's notification preferences. Requires a signed-in session;
    /// resolves to `Ok(None)` (entry idle) otherwise.
    pub async fn notification_preferences(
        &self,
    ) -> Result<Option<NotificationPreferences>, ApiError> {
        let api = self.api();
        let entry = self
            .cache()
            .get_or_fetch(QueryKey::NotificationPreferences, move || {
                let api = api.clone();
                async move {
                    api.get::<NotificationPreferences>("/users/notification-preferences")
                        .await
                }
            })
            .await;
        self.guard(entry.decode()).await
    }

    /// Flip one notification preference.
    ///
    /// The next value is computed locally (dependency rules applied) and
    /// written to the cache before the request resolves, so the switch moves
    /// immediately; on failure the pre-toggle value comes back and the error
    /// surfaces. The server's response is authoritative and overwrites the
    /// optimistic value on success.
    pub async fn set_notification_preference(
        &self,
        toggle: PreferenceToggle,
    ) -> Result<NotificationPreferences, ApiError> {
        let current = self.current_preferences();
        let next = current.apply(toggle);

        let api = self.api();
        let result = self
            .mutations()
            .run_optimistic(
                "notification-preferences",
                QueryKey::NotificationPreferences,
                &next,
                async move {
                    api.patch::<NotificationPreferences, _>(
                        "/users/notification-preferences",
                        &next,
                    )
                    .await
                },
            )
            .await;
        let prefs = self.guard(result).await?;

        // Keep the session's user copy in line with the server.
        if let Some(mut user) = self.session().user() {
            user.notification_preferences = prefs;
            self.session().replace_user(user);
        }
        Ok(prefs)
    }

    /// Register the device push token so reminders can be delivered.
    pub async fn register_push_token(&self, device_token: &str) -> Result<(), ApiError> {
        if device_token.trim().is_empty() {
            return Err(ApiError::Validation("Push token is empty.".to_string()));
        }

        let api = self.api();
        let token = device_token.to_string();
        let result = self
            .mutations()
            .run_invalidating("push-token", &[], async move {
                api.post_unit("/user/push-token", &PushTokenRequest { token: &token })
                    .await
            })
            .await;
        self.guard(result).await
    }

    /// Best available view of the current preferences: the cached query,
    /// else the profile copy, else the defaults.
    fn current_preferences(&self) -> NotificationPreferences {
        self.cache()
            .peek(&QueryKey::NotificationPreferences)
            .and_then(|entry| entry.decode::<NotificationPreferences>().ok().flatten())
            .or_else(|| self.session().user().map(|u| u.notification_preferences))
            .unwrap_or_default()
    }
}
