//! Privileged / hostNetwork / volume-mount validation against a platform's
//! allow-list (spec §4.4 "Resource assertions" memoization note; §7
//! "missing platform, privileged disallowed").

use serde_json::Value;

use crate::error::AdmissionError;

/// The subset of a platform's policy this module checks. Platforms that omit
/// an allow-list reject the corresponding escalation outright.
#[derive(Debug, Clone, Default)]
pub struct SecurityPolicy {
    pub allow_privileged: bool,
    pub allow_host_network: bool,
    pub allowed_volume_mount_paths: Vec<String>,
}

fn mount_path(mount: &Value) -> Option<&str> {
    mount.get("mountPath").and_then(Value::as_str)
}

/// Checks one task's privileged/hostNetwork/volumeMounts request against a
/// platform's policy (spec §4.4, memoized by the caller on
/// `(privileged, hostNetwork, tuple(volumeMounts), platform)`).
pub fn check_security(
    privileged: bool,
    host_network: bool,
    volume_mounts: &[Value],
    platform: &str,
    policy: &SecurityPolicy,
) -> Result<(), AdmissionError> {
    if privileged && !policy.allow_privileged {
        return Err(AdmissionError::PrivilegedDisallowed(platform.to_string()));
    }
    if host_network && !policy.allow_host_network {
        return Err(AdmissionError::HostNetworkDisallowed(platform.to_string()));
    }
    for mount in volume_mounts {
        let Some(path) = mount_path(mount) else { continue };
        if !policy.allowed_volume_mount_paths.iter().any(|allowed| allowed == path) {
            return Err(AdmissionError::VolumeMountDisallowed(path.to_string(), platform.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_privileged_when_platform_disallows() {
        let policy = SecurityPolicy::default();
        let err = check_security(true, false, &[], "cpu", &policy).unwrap_err();
        assert!(matches!(err, AdmissionError::PrivilegedDisallowed(_)));
    }

    #[test]
    fn allows_listed_volume_mount_path() {
        let policy = SecurityPolicy {
            allowed_volume_mount_paths: vec!["/data".to_string()],
            ..Default::default()
        };
        let mounts = vec![json!({"mountPath": "/data"})];
        assert!(check_security(false, false, &mounts, "cpu", &policy).is_ok());
    }

    #[test]
    fn rejects_unlisted_volume_mount_path() {
        let policy = SecurityPolicy::default();
        let mounts = vec![json!({"mountPath": "/etc"})];
        let err = check_security(false, false, &mounts, "cpu", &policy).unwrap_err();
        assert!(matches!(err, AdmissionError::VolumeMountDisallowed(_, _)));
    }
}
