mod close;
mod progress;

use crate::db::{Database, NewProfile};
use crate::types::RecordId;

/// Insert a profile with one link per URL on `platform`
pub(super) async fn seed_profile(
    db: &Database,
    name: &str,
    status: &str,
    image_url: Option<&str>,
    platform: &str,
    urls: &[&str],
) -> RecordId {
    let id = db
        .insert_profile(&NewProfile {
            name: name.to_string(),
            status: status.to_string(),
            image_url: image_url.map(str::to_string),
        })
        .await
        .unwrap();
    for url in urls {
        db.add_social_link(id, platform, url).await.unwrap();
    }
    id
}
