use slt_core::{ColumnSchema, DataType};
use slt_wire::{AlterStep, AlterTableRequest, TableIdentifier};

/// Accumulates schema-change steps for `Client::alter_table`. Steps
/// apply in the order they were added.
#[derive(Debug, Default)]
pub struct AlterTableBuilder {
    steps: Vec<AlterStep>,
    new_table_name: Option<String>,
}

impl AlterTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all accumulated steps and any pending rename.
    pub fn reset(&mut self) {
        self.steps.clear();
        self.new_table_name = None;
    }

    pub fn has_changes(&self) -> bool {
        self.new_table_name.is_some() || !self.steps.is_empty()
    }

    pub fn rename_table(&mut self, new_name: impl Into<String>) -> &mut Self {
        self.new_table_name = Some(new_name.into());
        self
    }

    pub fn add_column(&mut self, name: impl Into<String>, data_type: DataType) -> &mut Self {
        self.steps.push(AlterStep::AddColumn {
            schema: ColumnSchema::new(name, data_type),
        });
        self
    }

    pub fn add_nullable_column(
        &mut self,
        name: impl Into<String>,
        data_type: DataType,
    ) -> &mut Self {
        self.steps.push(AlterStep::AddColumn {
            schema: ColumnSchema::nullable(name, data_type),
        });
        self
    }

    pub fn drop_column(&mut self, name: impl Into<String>) -> &mut Self {
        self.steps.push(AlterStep::DropColumn { name: name.into() });
        self
    }

    pub fn rename_column(
        &mut self,
        old_name: impl Into<String>,
        new_name: impl Into<String>,
    ) -> &mut Self {
        self.steps.push(AlterStep::RenameColumn {
            old_name: old_name.into(),
            new_name: new_name.into(),
        });
        self
    }

    pub(crate) fn new_table_name(&self) -> Option<&str> {
        self.new_table_name.as_deref()
    }

    pub(crate) fn to_request(&self, table: TableIdentifier) -> AlterTableRequest {
        AlterTableRequest {
            table,
            steps: self.steps.clone(),
            new_table_name: self.new_table_name.clone(),
        }
    }
}
