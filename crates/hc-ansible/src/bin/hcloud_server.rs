use std::process::ExitCode;
use std::sync::Arc;

use hc_ansible::module::run_module;
use hc_ansible::server::{self, ServerArgs};
use hc_infra::{ActionWatcher, HetznerCloud};

#[tokio::main]
async fn main() -> ExitCode {
    run_module("hcloud_server", |args: ServerArgs| async move {
        let client = Arc::new(HetznerCloud::from_env(args.token.as_deref())?);
        let watcher = Arc::new(ActionWatcher::from_env());
        server::run(args, client, watcher).await
    })
    .await
}
