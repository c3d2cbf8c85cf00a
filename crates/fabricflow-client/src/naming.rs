//! Fabric URI helpers
//!
//! Applications and services are named `fabric:/App/Sub`. REST paths address
//! them by an id with the scheme stripped and every `/` replaced by `~`.

use crate::error::{FabricError, Result};

pub const FABRIC_SCHEME: &str = "fabric:";

/// Internal id used in REST paths: `fabric:/Shop/Cart` becomes `Shop~Cart`.
///
/// Applying it to an id returns the id unchanged.
pub fn application_id(name: &str) -> String {
    let name = name
        .strip_prefix("fabric:/")
        .or_else(|| name.strip_prefix("fabric:\\"))
        .unwrap_or(name);
    let name = name.strip_prefix('/').unwrap_or(name);
    name.replace('/', "~")
}

/// Services use the same transform as applications.
pub fn service_id(name: &str) -> String {
    application_id(name)
}

/// Owning application of a service: `fabric:/Shop/Cart` belongs to `fabric:/Shop`.
pub fn application_name_from_service(service_name: &str) -> Result<String> {
    let name = service_name.trim();
    if name.is_empty() {
        return Err(FabricError::Validation("service name required".to_string()));
    }
    let trimmed = name.strip_suffix('/').unwrap_or(name);
    let Some(last_slash) = trimmed.rfind('/') else {
        return Err(FabricError::Validation(format!(
            "service name {:?} does not include an application path",
            name
        )));
    };
    let parent = &trimmed[..last_slash];
    if parent.is_empty() || parent == FABRIC_SCHEME || parent == "fabric:/" {
        return Err(FabricError::Validation(format!(
            "service name {:?} is missing an application segment",
            name
        )));
    }
    Ok(parent.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_id() {
        assert_eq!(application_id("fabric:/App"), "App");
        assert_eq!(application_id("fabric:/Shop/Cart/Api"), "Shop~Cart~Api");
        assert_eq!(application_id("fabric:\\Shop/Cart"), "Shop~Cart");
        assert_eq!(application_id("/Shop/Cart"), "Shop~Cart");
        assert_eq!(application_id("Shop"), "Shop");
    }

    #[test]
    fn test_application_id_idempotent() {
        for name in ["fabric:/Shop/Cart", "fabric:/A", "Shop~Cart", "/x/y/z"] {
            let once = application_id(name);
            assert_eq!(application_id(&once), once);
            assert!(!once.contains('/'));
        }
    }

    #[test]
    fn test_strips_single_prefix() {
        assert_eq!(application_id("fabric:/fabric:/App"), "fabric:~App");
    }

    #[test]
    fn test_service_id() {
        assert_eq!(service_id("fabric:/Shop/Cart"), "Shop~Cart");
    }

    #[test]
    fn test_application_name_from_service() {
        assert_eq!(
            application_name_from_service("fabric:/Shop/Cart").unwrap(),
            "fabric:/Shop"
        );
        assert_eq!(
            application_name_from_service(" fabric:/Shop/Api/Cart/ ").unwrap(),
            "fabric:/Shop/Api"
        );
    }

    #[test]
    fn test_application_name_from_service_rejects() {
        assert!(application_name_from_service("").is_err());
        assert!(application_name_from_service("Cart").is_err());
        assert!(application_name_from_service("fabric:/Cart").is_err());
        assert!(application_name_from_service("/Cart").is_err());
    }
}
