/// How well a tool handles a given file extension.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum CapabilityVerdict {
    Supported,
    UnsupportedWithAlternative,
    BlockedWithAlternative,
}

#[derive(Debug, Clone)]
pub struct Capability {
    pub verdict: CapabilityVerdict,
    pub alternative: Option<&'static str>,
}

/// Static (tool, extension) capability matrix. Everything absent from the
/// table is assumed supported.
pub fn capability_for(tool_name: &str, extension: &str) -> Capability {
    let verdict = match (tool_name, extension) {
        ("data_view", ".json") => (
            CapabilityVerdict::UnsupportedWithAlternative,
            Some("read_file handles JSON better than the tabular viewer"),
        ),
        ("data_view", ".xml") => (
            CapabilityVerdict::UnsupportedWithAlternative,
            Some("read_file the XML as text instead"),
        ),
        ("data_view", ".md") | ("data_view", ".txt") => (
            CapabilityVerdict::UnsupportedWithAlternative,
            Some("read_file is the right tool for prose files"),
        ),
        ("read_file", ".zip") => (
            CapabilityVerdict::BlockedWithAlternative,
            Some("unzip the archive with the shell tool first"),
        ),
        ("read_file", ".parquet") => (
            CapabilityVerdict::BlockedWithAlternative,
            Some("use data_view for columnar data files"),
        ),
        _ => (CapabilityVerdict::Supported, None),
    };
    Capability {
        verdict: verdict.0,
        alternative: verdict.1,
    }
}

/// Warning text for a proposal that targets a file its tool handles badly.
pub fn capability_warning(tool_name: &str, path: &str) -> Option<String> {
    let extension = path.rfind('.').map(|i| &path[i..])?;
    let capability = capability_for(tool_name, &extension.to_lowercase());
    match capability.verdict {
        CapabilityVerdict::Supported => None,
        CapabilityVerdict::UnsupportedWithAlternative => Some(format!(
            "{} does not handle {} files well. Alternative: {}",
            tool_name,
            extension,
            capability.alternative.unwrap_or("use another tool")
        )),
        CapabilityVerdict::BlockedWithAlternative => Some(format!(
            "{} cannot read {} files. Alternative: {}",
            tool_name,
            extension,
            capability.alternative.unwrap_or("use another tool")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_has_alternative_for_data_view() {
        let capability = capability_for("data_view", ".json");
        assert_eq!(
            capability.verdict,
            CapabilityVerdict::UnsupportedWithAlternative
        );
        assert!(capability.alternative.unwrap().contains("read_file"));
    }

    #[test]
    fn test_zip_blocked_for_read_file() {
        let capability = capability_for("read_file", ".zip");
        assert_eq!(capability.verdict, CapabilityVerdict::BlockedWithAlternative);
        assert!(capability.alternative.unwrap().contains("unzip"));
    }

    #[test]
    fn test_warning_text() {
        let warning = capability_warning("data_view", "data.json").unwrap();
        assert!(warning.to_lowercase().contains("alternative"));

        assert!(capability_warning("data_view", "data.csv").is_none());
        assert!(capability_warning("read_file", "no_extension").is_none());
    }
}
