use super::names::CONTENT_CALENDAR;
use crate::capability::{Capability, Handler};
use crate::executor::{PREVIOUS_DATA_KEY, PREVIOUS_KEY};
use crate::store::{CalendarEntry, EntryStatus, Record, Store};
use async_trait::async_trait;
use sdk::{
    CapabilityArgs, CapabilityOutput, EngineError, FieldKind, InputSchema, StoreCapability,
    StoreReceipt,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Keeps the content calendar.
///
/// `add` without an explicit `entry.content` records the previous task's
/// output; when that output came from a publish, the entry is stored as
/// published with its post id.
pub struct ContentCalendar {
    store: Arc<Store>,
}

impl ContentCalendar {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn capability(handler: Handler) -> Capability {
        Capability::new(
            CONTENT_CALENDAR,
            "Manage the content calendar",
            InputSchema::empty()
                .required("action", FieldKind::one_of(&["add", "update", "view"]))
                .optional("entry", FieldKind::Object)
                .optional("id", FieldKind::Integer)
                .optional("platform", FieldKind::String)
                .optional("topic", FieldKind::String)
                .optional(
                    "status",
                    FieldKind::one_of(&["draft", "scheduled", "published"]),
                ),
            handler,
        )
    }

    fn entry_from_args(args: &CapabilityArgs) -> Result<CalendarEntry, EngineError> {
        let mut raw = match args.param_json("entry") {
            Ok(value) => value.clone(),
            Err(_) => json!({}),
        };
        let previous_data = args.params.get(PREVIOUS_DATA_KEY).cloned().unwrap_or(Value::Null);

        let fill = |raw: &mut Value, key: &str, value: Option<Value>| {
            if raw.get(key).map_or(true, Value::is_null) {
                if let Some(value) = value {
                    raw[key] = value;
                }
            }
        };

        fill(
            &mut raw,
            "platform",
            args.param_str_opt("platform")
                .map(|p| json!(p))
                .or_else(|| previous_data.get("platform").cloned()),
        );
        fill(&mut raw, "topic", args.param_str_opt("topic").map(|t| json!(t)));
        fill(
            &mut raw,
            "content",
            previous_data
                .get("content")
                .cloned()
                .or_else(|| args.param_str_opt(PREVIOUS_KEY).map(|p| json!(p))),
        );
        if let Some(post_id) = previous_data.get("postId").filter(|v| !v.is_null()) {
            fill(&mut raw, "postId", Some(post_id.clone()));
            fill(&mut raw, "status", Some(json!("published")));
        }
        fill(&mut raw, "status", args.param_str_opt("status").map(|s| json!(s)));

        serde_json::from_value(raw).map_err(|e| EngineError::schema(CONTENT_CALENDAR, e.to_string()))
    }

    async fn add(&self, args: &CapabilityArgs) -> Result<StoreReceipt, EngineError> {
        let entry = Self::entry_from_args(args)?;
        if entry.platform.trim().is_empty() {
            return Err(EngineError::schema(CONTENT_CALENDAR, "entry needs a platform"));
        }

        let record = self.store.calendar.add(entry).await?;
        Ok(StoreReceipt::committed(
            CapabilityOutput::with_data(
                format!("Calendar entry #{} added: {}", record.id, describe(&record)),
                serde_json::to_value(&record)?,
            ),
            self.store.calendar.name(),
            record.id,
        ))
    }

    async fn update(&self, args: &CapabilityArgs) -> Result<StoreReceipt, EngineError> {
        let id = args
            .param_u64("id")
            .map_err(|e| e.for_capability(CONTENT_CALENDAR))?;

        let mut patch = match args.param_json("entry") {
            Ok(value) => value.clone(),
            Err(_) => json!({}),
        };
        if let Some(status) = args.param_str_opt("status") {
            patch["status"] = json!(status);
        }
        if patch.as_object().map_or(true, |o| o.is_empty()) {
            return Err(EngineError::schema(
                CONTENT_CALENDAR,
                "update needs 'entry' or 'status'",
            ));
        }

        let record = self.store.calendar.patch(id, &patch).await?;
        Ok(StoreReceipt::committed(
            CapabilityOutput::with_data(
                format!("Calendar entry #{} updated: {}", record.id, describe(&record)),
                serde_json::to_value(&record)?,
            ),
            self.store.calendar.name(),
            record.id,
        ))
    }

    async fn view(&self, args: &CapabilityArgs) -> Result<StoreReceipt, EngineError> {
        let status = args
            .param_str_opt("status")
            .and_then(|s| s.parse::<EntryStatus>().ok());
        let records = self
            .store
            .calendar
            .view(|r| status.map_or(true, |s| r.fields.status == s))
            .await;

        let text = if records.is_empty() {
            "The content calendar is empty.".to_string()
        } else {
            let mut out = format!("{} calendar entr{}:", records.len(), if records.len() == 1 { "y" } else { "ies" });
            for record in &records {
                out.push_str(&format!("\n#{} {}", record.id, describe(record)));
            }
            out
        };

        Ok(StoreReceipt::read_only(CapabilityOutput::with_data(
            text,
            serde_json::to_value(&records)?,
        )))
    }
}

fn describe(record: &Record<CalendarEntry>) -> String {
    let entry = &record.fields;
    let when = entry.scheduled_for.as_deref().unwrap_or("unscheduled");
    let topic = if entry.topic.is_empty() {
        entry.content.chars().take(40).collect::<String>()
    } else {
        entry.topic.clone()
    };
    format!("[{}] {} {} - {}", entry.status, entry.platform, when, topic)
}

#[async_trait]
impl StoreCapability for ContentCalendar {
    async fn mutate(&self, args: &CapabilityArgs) -> Result<StoreReceipt, EngineError> {
        let action = args
            .param_str("action")
            .map_err(|e| e.for_capability(CONTENT_CALENDAR))?;

        match action {
            "add" => self.add(args).await,
            "update" => self.update(args).await,
            "view" => self.view(args).await,
            other => Err(EngineError::schema(
                CONTENT_CALENDAR,
                format!("unknown action '{}'", other),
            )),
        }
    }
}
