use std::collections::HashMap;

/// Resolves user-facing app aliases to platform-specific names or packages.
///
/// Each alias maps to a table of variants keyed `<platform>_<language>`
/// (display name) or `package_<platform>` (package id), e.g.
///
/// ```toml
/// [apps.wechat]
/// android_en = "WeChat"
/// android_cn = "微信"
/// package_android = "com.tencent.mm"
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppResolver {
    mapping: HashMap<String, HashMap<String, String>>,
    platform: String,
    language: String,
}

impl AppResolver {
    pub fn new(
        mapping: HashMap<String, HashMap<String, String>>,
        platform: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            mapping,
            platform: platform.into(),
            language: language.into(),
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Unknown aliases are returned unchanged. Lookup is case-insensitive on the alias.
    pub fn resolve(&self, alias: &str) -> String {
        let entry = self.mapping.get(alias).or_else(|| {
            self.mapping
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(alias))
                .map(|(_, v)| v)
        });
        let Some(entry) = entry else {
            return alias.to_string();
        };

        let localized = format!("{}_{}", self.platform, self.language);
        let package = format!("package_{}", self.platform);
        entry
            .get(&localized)
            .or_else(|| entry.get(&package))
            .or_else(|| {
                let mut keys: Vec<&String> = entry.keys().collect();
                keys.sort();
                keys.first().and_then(|k| entry.get(*k))
            })
            .cloned()
            .unwrap_or_else(|| alias.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(language: &str) -> AppResolver {
        let mut wechat = HashMap::new();
        wechat.insert("android_en".to_string(), "WeChat".to_string());
        wechat.insert("package_android".to_string(), "com.tencent.mm".to_string());
        let mut mapping = HashMap::new();
        mapping.insert("wechat".to_string(), wechat);
        AppResolver::new(mapping, "android", language)
    }

    #[test]
    fn localized_name_then_package_then_alias() {
        assert_eq!(resolver("en").resolve("WeChat"), "WeChat");
        assert_eq!(resolver("cn").resolve("wechat"), "com.tencent.mm");
        assert_eq!(resolver("en").resolve("Maps"), "Maps");
        assert_eq!(resolver("en").platform(), "android");
    }
}
