use std::process::ExitCode;

use hc_ansible::module::run_module;
use hc_ansible::ssh_key::{self, SshKeyArgs};
use hc_infra::HetznerCloud;

#[tokio::main]
async fn main() -> ExitCode {
    run_module("hcloud_ssh_key", |args: SshKeyArgs| async move {
        let client = HetznerCloud::from_env(args.token.as_deref())?;
        ssh_key::run(args, &client).await
    })
    .await
}
