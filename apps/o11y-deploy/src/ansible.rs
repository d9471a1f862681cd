//! Runners handing the deployer's output to Ansible.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use deploykit::ansible::Vars;
use deploykit::{GlobalConfig, Inventory, RunReport, RunRequest, Runner, RunnerError};
use serde_json::Value;
use tokio::process::Command;

const INVENTORY_FILE: &str = "inventory.yml";
const PLAYBOOK_FILE: &str = "playbook.yml";
const CONFIG_FILE: &str = "ansible.cfg";
/// Subdirectory of the data directory holding dry-run output.
const DRY_RUN_DIR: &str = "ansible";
/// Lines of engine output kept in a failure report.
const FAILURE_TAIL_LINES: usize = 40;

/// Connection settings added to the `all` group of every inventory.
///
/// The become password is only read when `with_secrets` is set.
pub fn connection_vars(global: &GlobalConfig, with_secrets: bool) -> Result<Vars, RunnerError> {
    let mut vars = Vars::new();
    vars.insert(
        "ansible_user".to_owned(),
        Value::from(global.ansible_user.as_str()),
    );
    if let Some(key) = &global.ansible_ssh_key_path {
        vars.insert(
            "ansible_ssh_private_key_file".to_owned(),
            Value::from(key.display().to_string()),
        );
    }
    if global.ansible_trust_on_first_use {
        let known_hosts = global.data_directory.join("known_hosts");
        vars.insert(
            "ansible_ssh_extra_args".to_owned(),
            Value::from(format!(
                "-o UserKnownHostsFile=\"{}\" -o StrictHostKeyChecking=no",
                known_hosts.display()
            )),
        );
    }
    if with_secrets && let Some(path) = &global.ansible_become_password_file {
        let password = std::fs::read_to_string(path).map_err(|source| RunnerError::Io {
            path: path.clone(),
            source,
        })?;
        vars.insert(
            "ansible_become_pass".to_owned(),
            Value::from(password.trim()),
        );
    }
    Ok(vars)
}

fn with_connection_vars(inventory: &Inventory, vars: Vars) -> Inventory {
    let mut inventory = inventory.clone();
    inventory.all_mut().vars.extend(vars);
    inventory
}

fn render_yaml<T: serde::Serialize>(
    what: &'static str,
    value: &T,
) -> Result<String, RunnerError> {
    serde_saphyr::to_string(value).map_err(|e| RunnerError::Render {
        what,
        message: e.to_string(),
    })
}

async fn write_file(path: &Path, contents: &str) -> Result<(), RunnerError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| RunnerError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes inventory and playbooks of the request into `dir`.
async fn write_request(dir: &Path, request: RunRequest<'_>, vars: Vars) -> Result<(), RunnerError> {
    let inventory = with_connection_vars(request.inventory, vars);
    write_file(
        &dir.join(INVENTORY_FILE),
        &render_yaml("inventory", &inventory)?,
    )
    .await?;
    write_file(
        &dir.join(PLAYBOOK_FILE),
        &render_yaml("playbook", &request.playbooks)?,
    )
    .await
}

fn tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

/// Runs `ansible-playbook` from the dependencies home.
pub struct AnsibleRunner {
    global: GlobalConfig,
    program: PathBuf,
    roles_path: PathBuf,
    /// Keep the generated files and run Ansible in debug mode.
    debug: bool,
}

impl AnsibleRunner {
    pub fn new(global: GlobalConfig, deps_home: &Path, debug: bool) -> Self {
        Self {
            global,
            program: deps_home.join("bin").join("ansible-playbook"),
            roles_path: deps_home.join("roles"),
            debug,
        }
    }

    fn ansible_config(&self) -> String {
        format!(
            "[defaults]\nroles_path = {}\nhost_key_checking = {}\n",
            self.roles_path.display(),
            !self.global.ansible_trust_on_first_use
        )
    }
}

#[async_trait]
impl Runner for AnsibleRunner {
    async fn run(&self, request: RunRequest<'_>) -> Result<RunReport, RunnerError> {
        if request.playbooks.is_empty() {
            return Err(RunnerError::NoPlaybooks);
        }
        let vars = connection_vars(&self.global, true)?;
        let workdir = tempfile::Builder::new()
            .prefix("o11y_")
            .tempdir()
            .map_err(|source| RunnerError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
        let dir = workdir.path();
        write_request(dir, request, vars).await?;
        let config = dir.join(CONFIG_FILE);
        write_file(&config, &self.ansible_config()).await?;

        let program = self.program.display().to_string();
        tracing::info!(
            group = request.target_group,
            program = %program,
            hosts = request.inventory.host_names().count(),
            "Starting ansible-playbook"
        );
        let mut command = Command::new(&self.program);
        command
            .arg("-i")
            .arg(dir.join(INVENTORY_FILE))
            .arg(dir.join(PLAYBOOK_FILE))
            .env("ANSIBLE_CONFIG", &config)
            .kill_on_drop(true);
        if self.debug {
            command.env("ANSIBLE_DEBUG", "1");
        }
        let output = command
            .output()
            .await
            .map_err(|source| RunnerError::Spawn {
                program: program.clone(),
                source,
            })?;

        if self.debug {
            let kept = workdir.keep();
            tracing::info!(dir = %kept.display(), "Ansible files kept");
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if !output.status.success() {
            return Err(RunnerError::Failed {
                program,
                status: output.status.to_string(),
                output: tail(&combined, FAILURE_TAIL_LINES),
            });
        }
        tracing::info!(group = request.target_group, "Playbook execution completed");
        Ok(RunReport { output: combined })
    }
}

/// Writes inventory and playbooks under `<data_directory>/ansible/<group>/` without running anything.
pub struct DryRunRunner {
    global: GlobalConfig,
}

impl DryRunRunner {
    pub fn new(global: GlobalConfig) -> Self {
        Self { global }
    }

    pub fn group_dir(&self, group: &str) -> PathBuf {
        self.global.data_directory.join(DRY_RUN_DIR).join(group)
    }
}

#[async_trait]
impl Runner for DryRunRunner {
    async fn run(&self, request: RunRequest<'_>) -> Result<RunReport, RunnerError> {
        if request.playbooks.is_empty() {
            return Err(RunnerError::NoPlaybooks);
        }
        let dir = self.group_dir(request.target_group);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| RunnerError::Io {
                path: dir.clone(),
                source,
            })?;
        write_request(&dir, request, connection_vars(&self.global, false)?).await?;
        tracing::info!(group = request.target_group, dir = %dir.display(), "Dry run, files written");
        Ok(RunReport {
            output: format!(
                "wrote {INVENTORY_FILE} and {PLAYBOOK_FILE} to {}",
                dir.display()
            ),
        })
    }
}
