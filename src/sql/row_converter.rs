/// Row environments - typed views of one source row for expression evaluation
use ahash::AHashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::reader::RowSource;
use crate::types::{ColumnType, Converter, Value};

/// Column name to value mapping for the current row.
///
/// Keys are stored uppercased, both bare (`NAME`) and qualified by the table
/// alias (`T.NAME`). A grouped row also carries every member row of its
/// group, and the single row of an aggregate-only query carries the final
/// accumulator values.
#[derive(Debug, Clone, Default)]
pub struct RowEnv {
    values: AHashMap<String, Value>,
    group: Option<Arc<Vec<RowEnv>>>,
    totals: Option<Arc<Vec<Value>>>,
}

impl RowEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_uppercase(), value);
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .get(name)
            .or_else(|| self.values.get(name.to_uppercase().as_str()))
    }

    /// Member rows when this row stands for a group.
    pub fn group(&self) -> Option<&[RowEnv]> {
        self.group.as_deref().map(Vec::as_slice)
    }

    pub fn with_group(mut self, members: Arc<Vec<RowEnv>>) -> Self {
        self.group = Some(members);
        self
    }

    /// Final aggregate values, indexed by aggregate slot.
    pub fn totals(&self) -> Option<&[Value]> {
        self.totals.as_deref().map(Vec::as_slice)
    }

    pub fn with_totals(mut self, totals: Arc<Vec<Value>>) -> Self {
        self.totals = Some(totals);
        self
    }

    /// Copy of this row with `extra` entries layered on top; later entries
    /// shadow existing ones.
    pub fn overlay<'a, I>(&self, extra: I) -> RowEnv
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        let mut env = self.clone();
        for (name, value) in extra {
            env.insert(name, value);
        }
        env
    }
}

/// Builds [`RowEnv`]s from the raw fields of a [`RowSource`].
#[derive(Debug, Clone)]
pub struct RowConverter {
    /// Uppercased column names
    names: Vec<String>,
    /// `ALIAS.NAME` keys, when the source has an alias
    qualified: Option<Vec<String>>,
    types: Vec<ColumnType>,
    converter: Arc<Converter>,
}

impl RowConverter {
    /// `types` holds one declared type per source column.
    pub fn new(source: &dyn RowSource, types: Vec<ColumnType>, converter: Arc<Converter>) -> Self {
        let names: Vec<String> = source
            .column_names()
            .iter()
            .map(|n| n.to_uppercase())
            .collect();
        let qualified = source.table_alias().map(|alias| {
            let alias = alias.to_uppercase();
            names.iter().map(|n| format!("{}.{}", alias, n)).collect()
        });
        Self {
            names,
            qualified,
            types,
            converter,
        }
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    fn column_type(&self, index: usize) -> ColumnType {
        self.types.get(index).copied().unwrap_or(ColumnType::String)
    }

    /// Convert one row of raw fields.
    pub fn convert(&self, fields: &[Option<&str>]) -> Result<RowEnv> {
        let mut env = RowEnv::new();
        for (i, name) in self.names.iter().enumerate() {
            let raw = fields.get(i).copied().flatten();
            let value = self.converter.convert(raw, self.column_type(i))?;
            if let Some(qualified) = &self.qualified {
                env.values.insert(qualified[i].clone(), value.clone());
            }
            env.values.insert(name.clone(), value);
        }
        Ok(env)
    }

    /// A row holding one representative literal per declared column type.
    pub fn literal_env(&self) -> RowEnv {
        let mut env = RowEnv::new();
        for (i, name) in self.names.iter().enumerate() {
            let value = Converter::literal_for(self.column_type(i));
            if let Some(qualified) = &self.qualified {
                env.values.insert(qualified[i].clone(), value.clone());
            }
            env.values.insert(name.clone(), value);
        }
        env
    }
}
