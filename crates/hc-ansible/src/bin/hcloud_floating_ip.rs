use std::process::ExitCode;

use hc_ansible::floating_ip::{self, FloatingIpArgs};
use hc_ansible::module::run_module;
use hc_infra::{ActionWatcher, HetznerCloud};

#[tokio::main]
async fn main() -> ExitCode {
    run_module("hcloud_floating_ip", |args: FloatingIpArgs| async move {
        let client = HetznerCloud::from_env(args.token.as_deref())?;
        floating_ip::run(args, &client, &ActionWatcher::from_env()).await
    })
    .await
}
