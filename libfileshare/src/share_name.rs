use log::warn;

const FILE_SHARE_NAME_MIN_LENGTH: usize = 3;
const FILE_SHARE_NAME_MAX_LENGTH: usize = 63;
const GENERATED_NAME_PREFIX: &str = "pvc-file";

/// File share names may only contain lowercase letters, digits and hyphens,
/// must begin and end with a letter or digit, must be 3 to 63 characters
/// long and cannot contain two consecutive hyphens.
///
/// A volume name that cannot be turned into such a name is replaced by a
/// freshly generated one.
pub fn valid_file_share_name(volume_name: &str) -> String {
    let mut name = volume_name.to_lowercase();
    if name.len() > FILE_SHARE_NAME_MAX_LENGTH {
        name = name.chars().take(FILE_SHARE_NAME_MAX_LENGTH).collect();
    }
    if name.len() < FILE_SHARE_NAME_MIN_LENGTH || !begins_and_ends_alphanumeric(&name) {
        name = generate_volume_name(
            GENERATED_NAME_PREFIX,
            &uuid::Uuid::new_v4().to_string(),
            FILE_SHARE_NAME_MAX_LENGTH,
        );
        warn!("the requested volume name ({volume_name:?}) is invalid, so it is regenerated as ({name:?})");
    }
    name.replace("--", "-")
}

fn begins_and_ends_alphanumeric(name: &str) -> bool {
    let valid = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    match (name.as_bytes().first(), name.as_bytes().last()) {
        (Some(&first), Some(&last)) => valid(first) && valid(last),
        _ => false,
    }
}

fn generate_volume_name(cluster: &str, pv_name: &str, max_length: usize) -> String {
    let mut prefix = format!("{cluster}-dynamic");
    if prefix.len() + pv_name.len() + 1 > max_length {
        prefix.truncate(max_length.saturating_sub(pv_name.len() + 1));
    }
    format!("{prefix}-{pv_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_name_kept() {
        assert_eq!(valid_file_share_name("pvc-1234"), "pvc-1234");
        assert_eq!(valid_file_share_name("PVC-ABC"), "pvc-abc");
        assert_eq!(valid_file_share_name("a--b"), "a-b");
    }

    #[test]
    fn test_long_name_truncated() {
        let name = "a".repeat(100);
        assert_eq!(valid_file_share_name(&name), "a".repeat(63));
    }

    #[test]
    fn test_invalid_name_regenerated() {
        for input in ["ab", "-abc", "abc-", ""] {
            let name = valid_file_share_name(input);
            assert!(name.starts_with("pvc-file-dynamic-"), "{input} -> {name}");
            assert!(name.len() <= FILE_SHARE_NAME_MAX_LENGTH);
        }
    }
}
