use super::names::LEADS_MANAGER;
use crate::capability::{Capability, Handler};
use crate::store::{Lead, LeadStatus, Record, Store};
use async_trait::async_trait;
use sdk::{
    CapabilityArgs, CapabilityOutput, EngineError, FieldKind, InputSchema, StoreCapability,
    StoreReceipt,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Adds, updates, lists and segments leads.
pub struct LeadsManager {
    store: Arc<Store>,
}

impl LeadsManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn capability(handler: Handler) -> Capability {
        let statuses: Vec<&'static str> = LeadStatus::ALL.iter().map(|s| s.as_str()).collect();
        Capability::new(
            LEADS_MANAGER,
            "Manage the leads list",
            InputSchema::empty()
                .required("action", FieldKind::one_of(&["add", "update", "view", "segment"]))
                .optional("lead", FieldKind::Object)
                .optional("id", FieldKind::Integer)
                .optional("status", FieldKind::OneOf(statuses.clone()))
                .optional("segment", FieldKind::OneOf(statuses)),
            handler,
        )
    }

    async fn add(&self, args: &CapabilityArgs) -> Result<StoreReceipt, EngineError> {
        let raw = args
            .param_json("lead")
            .map_err(|e| e.for_capability(LEADS_MANAGER))?;
        let lead: Lead = serde_json::from_value(raw.clone())
            .map_err(|e| EngineError::schema(LEADS_MANAGER, e.to_string()))?;
        if lead.name.trim().is_empty() || lead.email.trim().is_empty() {
            return Err(EngineError::schema(LEADS_MANAGER, "lead needs a name and an email"));
        }

        let record = self.store.leads.add(lead).await?;
        Ok(StoreReceipt::committed(
            CapabilityOutput::with_data(
                format!("Lead #{} added: {}", record.id, describe(&record)),
                serde_json::to_value(&record)?,
            ),
            self.store.leads.name(),
            record.id,
        ))
    }

    async fn update(&self, args: &CapabilityArgs) -> Result<StoreReceipt, EngineError> {
        let id = args
            .param_u64("id")
            .map_err(|e| e.for_capability(LEADS_MANAGER))?;

        let mut patch = match args.param_json("lead") {
            Ok(value) => value.clone(),
            Err(_) => json!({}),
        };
        if let Some(status) = args.param_str_opt("status") {
            patch["status"] = json!(status);
        }
        if patch.as_object().map_or(true, |o| o.is_empty()) {
            return Err(EngineError::schema(LEADS_MANAGER, "update needs 'lead' or 'status'"));
        }

        let record = self.store.leads.patch(id, &patch).await?;
        Ok(StoreReceipt::committed(
            CapabilityOutput::with_data(
                format!("Lead #{} updated: {}", record.id, describe(&record)),
                serde_json::to_value(&record)?,
            ),
            self.store.leads.name(),
            record.id,
        ))
    }

    async fn view(&self, args: &CapabilityArgs) -> Result<StoreReceipt, EngineError> {
        let status = args
            .param_str_opt("status")
            .and_then(|s| s.parse::<LeadStatus>().ok());
        let records = self
            .store
            .leads
            .view(|r| status.map_or(true, |s| r.fields.status == s))
            .await;

        Ok(StoreReceipt::read_only(CapabilityOutput::with_data(
            listing(&records),
            serde_json::to_value(&records)?,
        )))
    }

    async fn segment(&self, args: &CapabilityArgs) -> Result<StoreReceipt, EngineError> {
        let segment = args
            .param_str("segment")
            .map_err(|e| e.for_capability(LEADS_MANAGER))?
            .parse::<LeadStatus>()
            .map_err(|e| EngineError::schema(LEADS_MANAGER, e))?;

        let all = self.store.leads.all().await;
        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        for record in &all {
            *counts.entry(record.fields.status.as_str()).or_default() += 1;
        }
        let members: Vec<Record<Lead>> = all
            .into_iter()
            .filter(|r| r.fields.status == segment)
            .collect();

        let summary = counts
            .iter()
            .map(|(status, n)| format!("{}: {}", status, n))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(StoreReceipt::read_only(CapabilityOutput::with_data(
            format!(
                "Segment '{}' ({} of {})\n{}\nAll statuses: {}",
                segment,
                members.len(),
                counts.values().sum::<usize>(),
                listing(&members),
                if summary.is_empty() { "none" } else { summary.as_str() }
            ),
            json!({
                "segment": segment,
                "counts": counts,
                "members": members,
            }),
        )))
    }
}

fn describe(record: &Record<Lead>) -> String {
    format!(
        "{} <{}> [{}]",
        record.fields.name, record.fields.email, record.fields.status
    )
}

fn listing(records: &[Record<Lead>]) -> String {
    if records.is_empty() {
        return "No leads.".to_string();
    }
    let mut out = format!("{} lead(s):", records.len());
    for record in records {
        out.push_str(&format!("\n#{} {}", record.id, describe(record)));
    }
    out
}

#[async_trait]
impl StoreCapability for LeadsManager {
    async fn mutate(&self, args: &CapabilityArgs) -> Result<StoreReceipt, EngineError> {
        let action = args
            .param_str("action")
            .map_err(|e| e.for_capability(LEADS_MANAGER))?;

        match action {
            "add" => self.add(args).await,
            "update" => self.update(args).await,
            "view" => self.view(args).await,
            "segment" => self.segment(args).await,
            other => Err(EngineError::schema(
                LEADS_MANAGER,
                format!("unknown action '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager() -> (tempfile::TempDir, LeadsManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).await.unwrap());
        (dir, LeadsManager::new(store))
    }

    fn add_args(name: &str) -> CapabilityArgs {
        CapabilityArgs::new()
            .with_param("action", json!("add"))
            .with_param("lead", json!({"name": name, "email": format!("{}@x.com", name)}))
    }

    #[tokio::test]
    async fn test_add_commits_write() {
        let (_dir, leads) = manager().await;
        let receipt = leads.mutate(&add_args("ana")).await.unwrap();
        let write = receipt.committed.unwrap();
        assert_eq!(write.collection, "leads");
        assert_eq!(write.record_id, 1);
        assert!(receipt.output.text.contains("Lead #1 added"));
    }

    #[tokio::test]
    async fn test_add_requires_email() {
        let (_dir, leads) = manager().await;
        let args = CapabilityArgs::new()
            .with_param("action", json!("add"))
            .with_param("lead", json!({"name": "ana"}));
        assert!(matches!(
            leads.mutate(&args).await.unwrap_err(),
            EngineError::SchemaViolation { .. }
        ));
    }

    #[tokio::test]
    async fn test_update_status_and_segment() {
        let (_dir, leads) = manager().await;
        leads.mutate(&add_args("ana")).await.unwrap();
        leads.mutate(&add_args("luis")).await.unwrap();

        let update = CapabilityArgs::new()
            .with_param("action", json!("update"))
            .with_param("id", json!(2))
            .with_param("status", json!("interested"));
        leads.mutate(&update).await.unwrap();

        let segment = CapabilityArgs::new()
            .with_param("action", json!("segment"))
            .with_param("segment", json!("interested"));
        let receipt = leads.mutate(&segment).await.unwrap();
        assert!(receipt.committed.is_none());
        assert_eq!(receipt.output.data["counts"]["interested"], 1);
        assert_eq!(receipt.output.data["counts"]["new"], 1);
        assert_eq!(receipt.output.data["members"][0]["name"], "luis");
    }

    #[tokio::test]
    async fn test_update_missing_lead() {
        let (_dir, leads) = manager().await;
        let update = CapabilityArgs::new()
            .with_param("action", json!("update"))
            .with_param("id", json!(7))
            .with_param("status", json!("lost"));
        assert!(matches!(
            leads.mutate(&update).await.unwrap_err(),
            EngineError::RecordNotFound { id: 7, .. }
        ));
    }

    #[tokio::test]
    async fn test_view_empty() {
        let (_dir, leads) = manager().await;
        let args = CapabilityArgs::new().with_param("action", json!("view"));
        let receipt = leads.mutate(&args).await.unwrap();
        assert_eq!(receipt.output.text, "No leads.");
    }
}
