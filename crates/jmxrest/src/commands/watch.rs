//! `watch`: stream notifications to stdout.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use jmxrest_core::{
    AttributeChangeFilter, ListenerError, ManagementConnection, Notification, NotificationFilter,
    NotificationListener, TypePrefixFilter,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

/// One delivered notification, as printed.
#[derive(Debug, Serialize)]
struct NotificationLine {
    #[serde(rename = "type")]
    notification_type: String,
    source: Option<String>,
    sequence: i64,
    timestamp: Option<String>,
    message: Option<String>,
    attribute: Option<String>,
    user_data: serde_json::Value,
}

impl From<&Notification> for NotificationLine {
    fn from(n: &Notification) -> Self {
        Self {
            notification_type: n.notification_type.clone(),
            source: n.source.clone(),
            sequence: n.sequence_number,
            timestamp: n.timestamp.map(|t| t.to_rfc3339()),
            message: n.message.clone(),
            attribute: n.attribute_name().map(str::to_owned),
            user_data: n.user_data.clone(),
        }
    }
}

fn render_line(format: OutputFormat, line: &NotificationLine) -> String {
    match format {
        OutputFormat::Table => {
            let mut text = format!(
                "{}  #{:<5} {}",
                line.timestamp.as_deref().unwrap_or("-"),
                line.sequence,
                line.notification_type
            );
            if let Some(ref source) = line.source {
                text.push_str(&format!("  [{source}]"));
            }
            if let Some(ref attribute) = line.attribute {
                text.push_str(&format!("  {attribute}"));
            }
            if let Some(ref message) = line.message {
                text.push_str(&format!("  {message}"));
            }
            text
        }
        // One document per line keeps the stream parseable.
        OutputFormat::Json | OutputFormat::JsonCompact => {
            output::render_single(OutputFormat::JsonCompact, line, |_| String::new(), |_| String::new())
        }
        OutputFormat::Plain => line.notification_type.clone(),
    }
}

/// Combine the `--type` and `--attribute` selections. Both must pass.
fn build_filter(args: &WatchArgs) -> Option<Arc<dyn NotificationFilter>> {
    let types = (!args.types.is_empty())
        .then(|| args.types.iter().fold(TypePrefixFilter::new(), |f, p| f.enable(p.clone())));
    let attributes = (!args.attributes.is_empty()).then(|| {
        args.attributes
            .iter()
            .fold(AttributeChangeFilter::new(), |f, a| f.enable(a.clone()))
    });

    match (types, attributes) {
        (None, None) => None,
        (Some(t), None) => Some(Arc::new(t)),
        (None, Some(a)) => Some(Arc::new(a)),
        (Some(t), Some(a)) => Some(Arc::new(move |n: &Notification| {
            t.is_notification_enabled(n) && a.is_notification_enabled(n)
        })),
    }
}

pub async fn handle(
    connection: &ManagementConnection,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.count == Some(0) {
        return Ok(());
    }

    let channel = connection.notifications().await?;
    let (tx, mut rx) = mpsc::unbounded_channel::<NotificationLine>();
    let listener: Arc<dyn NotificationListener> = Arc::new(
        move |n: &Notification, _handback: Option<&jmxrest_core::Handback>| -> Result<(), ListenerError> {
            tx.send(NotificationLine::from(n))
                .map_err(|_| "watch output closed".into())
        },
    );
    let filter = build_filter(&args);

    let handle = match args.source {
        Some(ref source) => channel.register_for(source, listener, filter, None).await?,
        None => channel.register(listener, filter, None)?,
    };
    tracing::info!(source = ?args.source, "watching notifications");
    if !global.quiet {
        eprintln!("Watching notifications (Ctrl-C to stop)...");
    }

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    let mut seen = 0usize;
    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some(line) = received else {
                    tracing::debug!("notification channel closed");
                    if let Some(reason) = channel.closed_reason() {
                        return Err(reason.into());
                    }
                    break;
                };
                output::print_output(&render_line(global.output, &line), global.quiet);
                seen += 1;
                if args.count.is_some_and(|max| seen >= max) {
                    break;
                }
            }
            () = &mut deadline => break,
            _ = &mut interrupted => break,
        }
    }

    channel.unregister(handle).await;
    tracing::debug!(seen, "watch finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn args(types: &[&str], attributes: &[&str]) -> WatchArgs {
        WatchArgs {
            source: None,
            types: types.iter().map(ToString::to_string).collect(),
            attributes: attributes.iter().map(ToString::to_string).collect(),
            count: None,
            duration: None,
        }
    }

    fn attribute_change(name: &str) -> Notification {
        let mut n = Notification::new(jmxrest_core::notification::ATTRIBUTE_CHANGE);
        n.attributes
            .insert("attributeName".into(), serde_json::Value::String(name.into()));
        n
    }

    #[test]
    fn no_selection_means_no_filter() {
        assert!(build_filter(&args(&[], &[])).is_none());
    }

    #[test]
    fn type_and_attribute_selections_combine() {
        let filter = build_filter(&args(&["jmx.attribute"], &["HeapSize"])).unwrap();
        assert!(filter.is_notification_enabled(&attribute_change("HeapSize")));
        assert!(!filter.is_notification_enabled(&attribute_change("UpTime")));
        assert!(!filter.is_notification_enabled(&Notification::new("app.started")));
    }

    #[test]
    fn plain_prints_type_only() {
        let line = NotificationLine::from(&Notification::new("app.started").with_source("app:type=Main"));
        assert_eq!(render_line(OutputFormat::Plain, &line), "app.started");
        assert!(render_line(OutputFormat::Table, &line).contains("[app:type=Main]"));
        let json = render_line(OutputFormat::Json, &line);
        assert!(json.starts_with('{') && !json.contains('\n'));
    }
}
