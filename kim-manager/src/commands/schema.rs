use clap::ValueEnum;
use kim_api::{Policy, Role, User};

use super::CommandResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaKind {
    Policy,
    Role,
    User,
}

pub fn render(kind: SchemaKind) -> CommandResult<String> {
    let schema = match kind {
        SchemaKind::Policy => schemars::schema_for!(Policy),
        SchemaKind::Role => schemars::schema_for!(Role),
        SchemaKind::User => schemars::schema_for!(User),
    };
    Ok(serde_json::to_string_pretty(&schema)?)
}
