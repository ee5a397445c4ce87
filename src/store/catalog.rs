use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::model::{Channel, Macro, Rule, Stream, StreamId};
use crate::policy::{instantiate_template, validate_rule, PolicyError, TemplateInstantiation};
use crate::predicate::{is_function_name, tokenize, TokenKind};

use super::errors::{CatalogError, CatalogResult};

/// Read side of the metadata layer the planner depends on
#[async_trait]
pub trait MetadataCatalog: Send + Sync {
    async fn stream(&self, owner: &str, name: &str) -> CatalogResult<Option<Stream>>;

    /// Every rule the owner has stored, templates included
    async fn rules(&self, owner: &str) -> CatalogResult<Vec<Rule>>;

    async fn macros(&self, owner: &str) -> CatalogResult<Vec<Macro>>;
}

#[derive(Debug, Default)]
struct CatalogState {
    streams: BTreeMap<(String, String), Stream>,
    rules: BTreeMap<u64, Rule>,
    macros: BTreeMap<(String, String), Macro>,
    next_stream_id: u64,
    next_rule_id: u64,
}

/// In-process catalog with validated writes
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: RwLock<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stream and assigns its id
    ///
    /// Stream and channel names must be plain identifiers usable inside
    /// predicates. Channel names are unique per stream, case-insensitively.
    pub fn create_stream(
        &self,
        owner: &str,
        name: &str,
        channels: Vec<Channel>,
        tags: Vec<String>,
    ) -> CatalogResult<Stream> {
        if owner.trim().is_empty() {
            return Err(CatalogError::InvalidStream("owner is empty".into()));
        }
        check_identifier(name, "stream")?;
        if channels.is_empty() {
            return Err(CatalogError::InvalidStream(format!(
                "stream '{}' has no channels",
                name
            )));
        }
        let mut seen = HashSet::new();
        for channel in &channels {
            check_identifier(&channel.name, "channel")?;
            if !seen.insert(channel.name.to_ascii_lowercase()) {
                return Err(CatalogError::InvalidStream(format!(
                    "duplicate channel '{}'",
                    channel.name
                )));
            }
        }

        let mut state = self.write()?;
        let key = (owner.to_string(), name.to_string());
        if state.streams.contains_key(&key) {
            return Err(CatalogError::DuplicateStream {
                owner: key.0,
                name: key.1,
            });
        }
        state.next_stream_id += 1;
        let stream = Stream {
            id: StreamId::new(state.next_stream_id),
            owner: owner.to_string(),
            name: name.to_string(),
            channels,
            tags,
        };
        state.streams.insert(key, stream.clone());
        Ok(stream)
    }

    pub fn drop_stream(&self, owner: &str, name: &str) -> CatalogResult<Stream> {
        self.write()?
            .streams
            .remove(&(owner.to_string(), name.to_string()))
            .ok_or_else(|| CatalogError::StreamNotFound {
                owner: owner.to_string(),
                name: name.to_string(),
            })
    }

    /// Validates and stores a new rule, returning it with its assigned id
    pub fn add_rule(&self, mut rule: Rule) -> CatalogResult<Rule> {
        let mut state = self.write()?;
        rule.id = state.next_rule_id + 1;
        validate_rule(&rule)?;
        if let Some(template) = &rule.template_name {
            let taken = state
                .rules
                .values()
                .any(|r| r.owner == rule.owner && r.template_name.as_ref() == Some(template));
            if taken {
                return Err(PolicyError::DuplicateTemplate(template.clone()).into());
            }
        }
        state.next_rule_id = rule.id;
        state.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    /// Replaces a stored rule with the same id and owner
    pub fn update_rule(&self, rule: Rule) -> CatalogResult<()> {
        validate_rule(&rule)?;
        let mut state = self.write()?;
        match state.rules.get_mut(&rule.id) {
            Some(existing) if existing.owner == rule.owner => {
                *existing = rule;
                Ok(())
            }
            _ => Err(CatalogError::RuleNotFound(rule.id)),
        }
    }

    pub fn remove_rule(&self, owner: &str, id: u64) -> CatalogResult<Rule> {
        let mut state = self.write()?;
        if !state.rules.get(&id).map_or(false, |r| r.owner == owner) {
            return Err(CatalogError::RuleNotFound(id));
        }
        state.rules.remove(&id).ok_or(CatalogError::RuleNotFound(id))
    }

    /// Creates and stores a concrete rule from one of the owner's templates
    pub fn instantiate_template(
        &self,
        owner: &str,
        request: &TemplateInstantiation,
    ) -> CatalogResult<Rule> {
        let mut state = self.write()?;
        let template = state
            .rules
            .values()
            .find(|r| r.owner == owner && r.template_name.as_deref() == Some(request.template_name.as_str()))
            .cloned()
            .ok_or_else(|| PolicyError::UnknownTemplate(request.template_name.clone()))?;

        let rule = instantiate_template(&template, request, state.next_rule_id + 1)?;
        state.next_rule_id = rule.id;
        state.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    /// Defines or redefines an owner macro
    pub fn set_macro(&self, owner: &str, name: &str, value: &str) -> CatalogResult<()> {
        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !name.starts_with(|c: char| c.is_ascii_digit());
        if !valid {
            return Err(CatalogError::InvalidMacro(format!(
                "'{}' is not a valid macro name",
                name
            )));
        }
        if value.contains(&format!("$({})", name)) {
            return Err(CatalogError::InvalidMacro(format!(
                "macro '{}' refers to itself",
                name
            )));
        }
        self.write()?.macros.insert(
            (owner.to_string(), name.to_string()),
            Macro {
                owner: owner.to_string(),
                name: name.to_string(),
                value: value.to_string(),
            },
        );
        Ok(())
    }

    pub fn remove_macro(&self, owner: &str, name: &str) -> CatalogResult<()> {
        self.write()?
            .macros
            .remove(&(owner.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| CatalogError::InvalidMacro(format!("macro '{}' not defined", name)))
    }

    fn read(&self) -> CatalogResult<RwLockReadGuard<'_, CatalogState>> {
        self.state.read().map_err(|_| CatalogError::Poisoned)
    }

    fn write(&self) -> CatalogResult<RwLockWriteGuard<'_, CatalogState>> {
        self.state.write().map_err(|_| CatalogError::Poisoned)
    }
}

/// Names must lex as a single identifier that is not `timestamp` or a function
fn check_identifier(name: &str, what: &str) -> CatalogResult<()> {
    let is_single_ident = matches!(
        tokenize(name).as_deref(),
        Ok([first, eof]) if matches!(first.kind, TokenKind::Ident(_)) && eof.kind == TokenKind::Eof
    );
    if !is_single_ident
        || name.eq_ignore_ascii_case("timestamp")
        || is_function_name(name)
    {
        return Err(CatalogError::InvalidStream(format!(
            "'{}' is not a valid {} name",
            name, what
        )));
    }
    Ok(())
}

#[async_trait]
impl MetadataCatalog for MemoryCatalog {
    async fn stream(&self, owner: &str, name: &str) -> CatalogResult<Option<Stream>> {
        Ok(self
            .read()?
            .streams
            .get(&(owner.to_string(), name.to_string()))
            .cloned())
    }

    async fn rules(&self, owner: &str) -> CatalogResult<Vec<Rule>> {
        Ok(self
            .read()?
            .rules
            .values()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect())
    }

    async fn macros(&self, owner: &str) -> CatalogResult<Vec<Macro>> {
        Ok(self
            .read()?
            .macros
            .values()
            .filter(|m| m.owner == owner)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChannelType;

    fn rule(action: &str) -> Rule {
        Rule {
            id: 0,
            owner: "alice".into(),
            priority: None,
            target_users: None,
            target_streams: None,
            condition: None,
            action: action.into(),
            template_name: None,
        }
    }

    #[test]
    fn test_create_stream_assigns_ids_and_rejects_duplicates() {
        let catalog = MemoryCatalog::new();
        let channels = vec![Channel::new("temp", ChannelType::Float)];
        let a = catalog.create_stream("alice", "env", channels.clone(), vec![]).unwrap();
        let b = catalog.create_stream("bob", "env", channels.clone(), vec![]).unwrap();
        assert_ne!(a.id, b.id);
        assert!(matches!(
            catalog.create_stream("alice", "env", channels, vec![]),
            Err(CatalogError::DuplicateStream { .. })
        ));
    }

    #[test]
    fn test_channel_names_must_be_identifiers() {
        let catalog = MemoryCatalog::new();
        for bad in ["timestamp", "hour", "GPS_DISTANCE", "and", "a.b", "two words", "1x"] {
            let result = catalog.create_stream(
                "alice",
                "env",
                vec![Channel::new(bad, ChannelType::Int)],
                vec![],
            );
            assert!(result.is_err(), "{} accepted", bad);
        }
        let dup = catalog.create_stream(
            "alice",
            "env",
            vec![
                Channel::new("temp", ChannelType::Int),
                Channel::new("TEMP", ChannelType::Int),
            ],
            vec![],
        );
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_rules_are_validated_and_scoped_by_owner() {
        let catalog = MemoryCatalog::new();
        let stored = catalog.add_rule(rule("allow")).unwrap();
        assert_eq!(stored.id, 1);
        assert!(matches!(
            catalog.add_rule(rule("permit")),
            Err(CatalogError::Policy(PolicyError::InvalidAction { .. }))
        ));
        assert_eq!(catalog.rules("alice").await.unwrap().len(), 1);
        assert!(catalog.rules("bob").await.unwrap().is_empty());
        assert!(catalog.remove_rule("bob", 1).is_err());
        catalog.remove_rule("alice", 1).unwrap();
        assert!(catalog.rules("alice").await.unwrap().is_empty());
    }

    #[test]
    fn test_template_names_unique_and_instantiable() {
        let catalog = MemoryCatalog::new();
        let mut template = rule("allow");
        template.template_name = Some("warm".into());
        template.condition = Some("temp > $(LIMIT)".into());
        catalog.add_rule(template.clone()).unwrap();
        assert!(matches!(
            catalog.add_rule(template),
            Err(CatalogError::Policy(PolicyError::DuplicateTemplate(_)))
        ));

        let request = TemplateInstantiation {
            template_name: "warm".into(),
            priority: Some(3),
            parameters: [("LIMIT".to_string(), "30".to_string())].into_iter().collect(),
            ..Default::default()
        };
        let concrete = catalog.instantiate_template("alice", &request).unwrap();
        assert_eq!(concrete.condition.as_deref(), Some("temp > 30"));
        assert_eq!(concrete.id, 2);
        assert!(catalog.instantiate_template("bob", &request).is_err());
    }

    #[tokio::test]
    async fn test_macros() {
        let catalog = MemoryCatalog::new();
        catalog.set_macro("alice", "HOME", "place = 'home'").unwrap();
        assert!(catalog.set_macro("alice", "bad name", "x").is_err());
        assert!(catalog.set_macro("alice", "LOOP", "$(LOOP) OR x > 1").is_err());
        let macros = catalog.macros("alice").await.unwrap();
        assert_eq!(macros.len(), 1);
        assert_eq!(macros[0].value, "place = 'home'");
    }
}
