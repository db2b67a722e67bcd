//! Isolation profile: the resource and privilege restrictions applied to
//! every environment, rendered as container runtime flags.

use crate::config::{SandboxConfig, Scratch};

/// Writable, size-bounded, non-persistent tmpfs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchMount {
    pub path: String,
    pub size_mib: u32,
    pub exec: bool,
}

impl ScratchMount {
    pub fn executable(scratch: &Scratch) -> Self {
        Self {
            path: scratch.path.clone(),
            size_mib: scratch.size_mib,
            exec: true,
        }
    }

    fn mount_spec(&self) -> String {
        let exec = if self.exec { "exec" } else { "noexec" };
        format!("{}:rw,{exec},nosuid,nodev,size={}m", self.path, self.size_mib)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationProfile {
    pub uid: u32,
    pub gid: u32,
    pub pids: u32,
    pub cpu_secs: u32,
    pub memory_mib: u32,
    pub nofile: u32,
    pub cpus: String,
    pub scratch: Option<ScratchMount>,
    pub env: Vec<(String, String)>,
}

impl IsolationProfile {
    /// Base profile shared by every backend: no scratch, no extra env.
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            uid: config.uid,
            gid: config.gid,
            pids: config.limits.pids,
            cpu_secs: config.limits.cpu_secs,
            memory_mib: config.limits.memory_mib,
            nofile: config.limits.nofile,
            cpus: config.limits.cpus.clone(),
            scratch: None,
            env: Vec::new(),
        }
    }

    pub fn with_scratch(mut self, scratch: ScratchMount) -> Self {
        self.scratch = Some(scratch);
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Flags for `docker run`, in a fixed order.
    pub fn to_args(&self) -> Vec<String> {
        let memory = format!("{}m", self.memory_mib);
        let mut args: Vec<String> = vec![
            "--network".into(),
            "none".into(),
            "--read-only".into(),
            "--user".into(),
            format!("{}:{}", self.uid, self.gid),
            "--pids-limit".into(),
            self.pids.to_string(),
            "--cpus".into(),
            self.cpus.clone(),
            "--memory".into(),
            memory.clone(),
            // Equal to --memory: no swap on top.
            "--memory-swap".into(),
            memory,
            "--ulimit".into(),
            format!("nproc={0}:{0}", self.pids),
            "--ulimit".into(),
            format!("nofile={0}:{0}", self.nofile),
            "--ulimit".into(),
            format!("cpu={0}:{0}", self.cpu_secs),
            "--security-opt".into(),
            "no-new-privileges=true".into(),
            "--cap-drop".into(),
            "ALL".into(),
            "--ipc".into(),
            "none".into(),
            "--workdir".into(),
            "/".into(),
        ];

        if let Some(scratch) = &self.scratch {
            args.push("--tmpfs".into());
            args.push(scratch.mount_spec());
        }

        for (key, value) in &self.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_after<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
        args.windows(2)
            .filter(|w| w[0] == flag)
            .map(|w| w[1].as_str())
            .collect()
    }

    #[test]
    fn base_profile_flags() {
        let args = IsolationProfile::from_config(&SandboxConfig::default()).to_args();

        assert_eq!(value_after(&args, "--network"), ["none"]);
        assert!(args.contains(&"--read-only".to_string()));
        assert_eq!(value_after(&args, "--user"), ["65534:65534"]);
        assert_eq!(value_after(&args, "--pids-limit"), ["64"]);
        assert_eq!(value_after(&args, "--memory"), ["256m"]);
        assert_eq!(value_after(&args, "--memory-swap"), ["256m"]);
        assert_eq!(
            value_after(&args, "--ulimit"),
            ["nproc=64:64", "nofile=256:256", "cpu=5:5"]
        );
        assert_eq!(value_after(&args, "--security-opt"), ["no-new-privileges=true"]);
        assert_eq!(value_after(&args, "--cap-drop"), ["ALL"]);
        assert_eq!(value_after(&args, "--ipc"), ["none"]);
        assert_eq!(value_after(&args, "--workdir"), ["/"]);
        assert!(value_after(&args, "--tmpfs").is_empty());
    }

    #[test]
    fn scratch_is_opt_in() {
        let config = SandboxConfig::default();
        let profile = IsolationProfile::from_config(&config)
            .with_scratch(ScratchMount::executable(&config.scratch));

        assert_eq!(
            value_after(&profile.to_args(), "--tmpfs"),
            ["/tmp:rw,exec,nosuid,nodev,size=64m"]
        );
    }

    #[test]
    fn noexec_scratch() {
        let scratch = ScratchMount {
            path: "/scratch".into(),
            size_mib: 8,
            exec: false,
        };
        assert_eq!(scratch.mount_spec(), "/scratch:rw,noexec,nosuid,nodev,size=8m");
    }

    #[test]
    fn env_follows_restrictions() {
        let args = IsolationProfile::from_config(&SandboxConfig::default())
            .with_env("PYTHONDONTWRITEBYTECODE", "1")
            .to_args();
        assert_eq!(&args[args.len() - 2..], ["-e", "PYTHONDONTWRITEBYTECODE=1"]);
    }
}
