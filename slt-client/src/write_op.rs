use std::sync::Arc;

use slt_core::Row;

use crate::table::Table;

/// An insert mutation bound to a table. Key columns must be fully set
/// before the session accepts it.
pub struct Insert {
    table: Arc<Table>,
    row: Row,
}

impl Insert {
    pub(crate) fn new(table: Arc<Table>, row: Row) -> Self {
        Self { table, row }
    }

    pub fn row(&self) -> &Row {
        &self.row
    }

    pub fn row_mut(&mut self) -> &mut Row {
        &mut self.row
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }
}

impl std::fmt::Debug for Insert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Insert")
            .field("table", &self.table.name())
            .field("row", &self.row)
            .finish()
    }
}
