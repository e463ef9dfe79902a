//! Belongs-to resolution with one batched query per relation.

use std::any::Any;

use crate::query::{Predicate, SelectPlan};
use crate::{Connection, Filter, Gateway, Record, StorageError, Value};

impl Gateway {
    /// Load the parents of `children` for `relation` and attach them.
    ///
    /// Issues a single `IN` query over the distinct non-null foreign keys.
    /// Children whose key is null or matches no parent are left unset.
    pub async fn attach<C, T>(
        &self,
        conn: &C,
        children: &mut [T],
        relation: &str,
    ) -> Result<(), StorageError>
    where
        C: Connection + ?Sized,
        T: Record,
    {
        let descriptor = T::descriptor()?;
        let relation = descriptor.relation(relation).ok_or_else(|| {
            StorageError::Relation(format!(
                "{} declares no relation {}",
                descriptor.type_name, relation
            ))
        })?;
        let parent = relation.parent()?;

        let mut child_keys = Vec::with_capacity(children.len());
        let mut keys: Vec<Value> = Vec::new();
        for child in children.iter() {
            let key = child.get(&relation.local_column).ok_or_else(|| {
                StorageError::Schema(format!(
                    "{} does not expose column {}",
                    descriptor.type_name, relation.local_column
                ))
            })?;
            if !key.is_null() && !keys.contains(&key) {
                keys.push(key.clone());
            }
            child_keys.push(key);
        }

        if keys.is_empty() {
            return Ok(());
        }

        tracing::trace!(
            relation = %relation.name,
            children = children.len(),
            keys = keys.len(),
            "loading parents"
        );

        let plan = SelectPlan {
            predicates: vec![Predicate::Filter(Filter::In(
                relation.remote_column.clone(),
                keys,
            ))],
            ..SelectPlan::default()
        };
        let statement = plan.build(parent)?;
        let result = self.run(conn, &statement).await?;

        let key_position = parent.position(&relation.remote_column).ok_or_else(|| {
            StorageError::Relation(format!(
                "{} has no column {}",
                parent.table, relation.remote_column
            ))
        })?;

        let mut parents: Vec<(Value, Vec<Value>)> = Vec::with_capacity(result.rows.len());
        for row in result.rows {
            if row.values.len() != parent.columns.len() {
                return Err(StorageError::Mapping(format!(
                    "{} row has {} values, expected {}",
                    parent.table,
                    row.values.len(),
                    parent.columns.len()
                )));
            }
            let key = row.values[key_position].clone();
            parents.push((key, row.values));
        }

        let mut attached: Vec<(usize, Box<dyn Any + Send>)> = Vec::new();
        for (idx, key) in child_keys.iter().enumerate() {
            if key.is_null() {
                continue;
            }
            let Some((_, values)) = parents.iter().find(|(k, _)| k == key) else {
                continue;
            };
            if let Some(related) = relation.materialize(values.clone())? {
                attached.push((idx, related));
            }
        }

        for (idx, related) in attached {
            children[idx].set_related(&relation.name, related)?;
        }

        Ok(())
    }
}
