use std::fmt;

/// Build information, stamped at compile time where available.
#[derive(Debug, Clone)]
pub struct Version {
    pub version: &'static str,
    pub branch: &'static str,
    pub build_date: &'static str,
    pub platform: String,
}

pub fn get() -> Version {
    Version {
        version: env!("CARGO_PKG_VERSION"),
        branch: option_env!("HC_ANSIBLE_BRANCH").unwrap_or("unknown"),
        build_date: option_env!("HC_ANSIBLE_BUILD_DATE").unwrap_or("unknown"),
        platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Version:\t{}", self.version)?;
        writeln!(f, "BuildDate:\t{}", self.build_date)?;
        writeln!(f, "Branch:\t\t{}", self.branch)?;
        write!(f, "Platform:\t{}", self.platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_lists_every_field() {
        let text = get().to_string();
        assert!(text.starts_with(&format!("Version:\t{}", env!("CARGO_PKG_VERSION"))));
        assert!(text.contains("BuildDate:\t"));
        assert!(text.contains("Branch:\t\t"));
        assert!(text.contains(std::env::consts::OS));
    }
}
