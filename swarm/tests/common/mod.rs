//! Shared test doubles

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use proxmox_swarm::backend::{Backend, Credentials, RunOptions};

/// One recorded backend invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub sub_command: String,
    pub args: Vec<String>,
    pub options: RunOptions,
    pub host: Option<String>,
}

impl Call {
    /// Sub-command followed by positional args and option flags
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.sub_command.clone()];
        argv.extend(self.args.iter().cloned());
        argv.extend(self.options.to_flags());
        argv
    }
}

/// Backend that records every call and answers with scripted statuses
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<Vec<(String, String, i32)>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `status` to calls of `sub_command` whose args contain `arg`
    pub fn fail_on(self, sub_command: &str, arg: &str, status: i32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .push((sub_command.to_string(), arg.to_string(), status));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn argvs(&self) -> Vec<Vec<String>> {
        self.calls().iter().map(Call::argv).collect()
    }

    pub fn count(&self, sub_command: &str, first_arg: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.sub_command == sub_command && c.args.first().map(String::as_str) == Some(first_arg))
            .count()
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    async fn run(
        &self,
        sub_command: &str,
        args: &[String],
        credentials: &Credentials,
        options: &RunOptions,
    ) -> i32 {
        self.calls.lock().unwrap().push(Call {
            sub_command: sub_command.to_string(),
            args: args.to_vec(),
            options: options.clone(),
            host: credentials.host.clone(),
        });

        self.failures
            .lock()
            .unwrap()
            .iter()
            .find(|(cmd, arg, _)| cmd == sub_command && args.iter().any(|a| a == arg))
            .map(|(_, _, status)| *status)
            .unwrap_or(0)
    }
}

/// Descriptor exercising every section the interpreter understands
pub const STACK_YAML: &str = r#"
services:
  web:
    image: nginx:1.25
    ports:
      - "80:80"
    environment:
      - MODE=prod
    deploy:
      replicas: 2
    tags: [frontend]
    vlan: 100
    volumes:
      - data:/srv/data:ro
  worker:
    image: busybox
    volumes:
      - source: cache
        target: /cache
volumes:
  data:
    subvolume: vol/data
    options:
      size: 10G
  cache:
    external: true
"#;

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
