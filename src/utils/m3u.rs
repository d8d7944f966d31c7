//! Filename derivation for M3U output (§4.E "Filename derives from the
//! parent's display name...").

use std::path::{Path, PathBuf};

const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect()
}

/// Picks a non-colliding path under `dir` for `base_name.m3u`, appending
/// `_<n>` for n=1..100 on collision, failing past that (§4.E).
pub async fn resolve_collision_free_path(dir: &Path, base_name: &str) -> Option<PathBuf> {
    let sanitized = sanitize_name(base_name);
    let candidate = dir.join(format!("{sanitized}.m3u"));
    if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
        return Some(candidate);
    }
    for n in 1..100 {
        let candidate = dir.join(format!("{sanitized}_{n}.m3u"));
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn replaces_forbidden_characters() {
        assert_eq!(sanitize_name("Rock/Pop: Best?"), "Rock_Pop_ Best_");
    }

    #[tokio::test]
    async fn finds_free_path_when_base_name_collides() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("Mix.m3u"), b"").await.unwrap();
        let path = resolve_collision_free_path(dir.path(), "Mix").await.unwrap();
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "Mix_1.m3u");
    }

    proptest! {
        #[test]
        fn sanitized_output_never_contains_forbidden_characters(name in ".{0,64}") {
            let sanitized = sanitize_name(&name);
            prop_assert!(!sanitized.chars().any(|c| FORBIDDEN.contains(&c)));
        }

        #[test]
        fn sanitize_name_preserves_char_count(name in ".{0,64}") {
            let sanitized = sanitize_name(&name);
            prop_assert_eq!(sanitized.chars().count(), name.chars().count());
        }
    }
}
