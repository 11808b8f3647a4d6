//! Read-only connector queries: server info, MBean count, domains, raw GET.

use serde::Serialize;
use tabled::Tabled;

use jmxrest_core::{ManagementConnection, ServerInfo};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

fn info_detail(info: &ServerInfo) -> String {
    let optional = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
    output::render_detail(&[
        ("Version", info.version.to_string()),
        ("MBeans", info.mbeans.clone()),
        ("MBean count", info.mbean_count.clone()),
        ("Default domain", info.default_domain.clone()),
        ("Domains", info.domains.clone()),
        ("Notifications", info.notifications.clone()),
        ("Create MBean", optional(&info.create_mbean)),
        ("Instance of", optional(&info.instance_of)),
        ("File transfer", optional(&info.file_transfer)),
        ("API", optional(&info.api)),
        ("Graph", optional(&info.graph)),
    ])
}

pub fn server_info(connection: &ManagementConnection, global: &GlobalOpts) -> Result<(), CliError> {
    let surface = connection.request_surface()?;
    let info = surface.server_info()?;
    let out = output::render_single(global.output, info, info_detail, |i| i.version.to_string());
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn mbean_count(connection: &ManagementConnection, global: &GlobalOpts) -> Result<(), CliError> {
    let count = connection.request_surface()?.mbean_count().await?;
    let out = output::render_single(global.output, &count, u64::to_string, u64::to_string);
    output::print_output(&out, global.quiet);
    Ok(())
}

#[derive(Serialize, Tabled)]
struct DomainRow {
    #[tabled(rename = "Domain")]
    domain: String,
}

pub async fn domains(connection: &ManagementConnection, global: &GlobalOpts) -> Result<(), CliError> {
    let surface = connection.request_surface()?;
    let mut domains = surface.domains().await?;
    domains.sort();
    let out = output::render_list(
        global.output,
        &domains,
        |d| DomainRow { domain: d.clone() },
        String::clone,
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn get(connection: &ManagementConnection, path: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let value = connection.request_surface()?.get_json(path).await?;
    let pretty = |v: &serde_json::Value| serde_json::to_string_pretty(v).unwrap_or_default();
    let out = output::render_single(global.output, &value, pretty, |v| match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
