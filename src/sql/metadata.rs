/// Result column metadata
use std::sync::Arc;

use super::ast::{Expr, SelectColumn};
use super::evaluator::ExprEvaluator;
use super::row_converter::RowConverter;
use crate::types::DEFAULT_COLUMN_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    /// Underlying column name for plain column references, else the label
    pub name: String,
    /// Output name (the projection alias)
    pub label: String,
    /// Inferred type name; `expression` when it cannot be inferred
    pub type_name: String,
    pub display_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultMetadata {
    pub columns: Vec<ColumnMetadata>,
}

impl ResultMetadata {
    /// Infer output types by evaluating every projection once against a row
    /// of representative literals. Aggregates see that row as a one-member group.
    pub(crate) fn infer(
        projection: &[SelectColumn],
        converter: &RowConverter,
        column_sizes: &[usize],
        evaluator: &ExprEvaluator,
    ) -> Self {
        let literal = converter.literal_env();
        let env = literal.clone().with_group(Arc::new(vec![literal]));

        let columns = projection
            .iter()
            .map(|column| {
                let type_name = evaluator
                    .eval(&column.expr, &env)
                    .map(|v| v.type_name())
                    .unwrap_or("expression")
                    .to_string();

                let (name, display_size) = match &column.expr {
                    Expr::Column(name) => {
                        let size = column_index(converter.column_names(), name)
                            .and_then(|i| column_sizes.get(i).copied())
                            .unwrap_or(DEFAULT_COLUMN_SIZE);
                        (name.clone(), size)
                    }
                    _ => (column.alias.clone(), DEFAULT_COLUMN_SIZE),
                };

                ColumnMetadata {
                    name,
                    label: column.alias.clone(),
                    type_name,
                    display_size,
                }
            })
            .collect();

        Self { columns }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// 1-based column.
    pub fn column(&self, index: usize) -> Option<&ColumnMetadata> {
        index.checked_sub(1).and_then(|i| self.columns.get(i))
    }
}

/// Position of `name` (bare or `alias.name`) among uppercased column names.
fn column_index(names: &[String], name: &str) -> Option<usize> {
    let upper = name.to_uppercase();
    let bare = upper.rsplit_once('.').map_or(upper.as_str(), |(_, n)| n);
    names.iter().position(|n| *n == upper || n == bare)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ListReader;
    use crate::sql::lexer::Lexer;
    use crate::sql::parser::Parser;
    use crate::types::{ColumnType, Converter};

    #[test]
    fn test_infer_types() {
        let reader = ListReader::new(vec!["Id".to_string(), "Name".to_string()], vec![]);
        let types = vec![ColumnType::Int, ColumnType::String];
        let converter = Arc::new(Converter::default());
        let row_converter = RowConverter::new(&reader, types, converter.clone());
        let evaluator = ExprEvaluator::new(converter);

        let tokens = Lexer::new("SELECT id, name AS n, id * 1.5, COUNT(*), SUM(id), AVG(id), NULL FROM t")
            .tokenize()
            .unwrap();
        let stmt = Parser::new(tokens).parse().unwrap();

        let meta = ResultMetadata::infer(&stmt.columns, &row_converter, &[5, 30], &evaluator);
        let types: Vec<&str> = meta.columns.iter().map(|c| c.type_name.as_str()).collect();
        assert_eq!(
            types,
            vec!["Int", "String", "Double", "Long", "Long", "Double", "expression"]
        );

        let name = meta.column(2).unwrap();
        assert_eq!(name.name, "name");
        assert_eq!(name.label, "n");
        assert_eq!(name.display_size, 30);
        assert_eq!(meta.column(1).unwrap().display_size, 5);
        assert_eq!(meta.column(3).unwrap().display_size, DEFAULT_COLUMN_SIZE);
        assert!(meta.column(0).is_none());
        assert_eq!(meta.column_count(), 7);
    }
}
