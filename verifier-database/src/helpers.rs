/// Content-addressed upsert: `INSERT .. ON CONFLICT DO NOTHING`, then a
/// select by the unique columns when the row already existed. Returns
/// the model and whether this call inserted it.
macro_rules! insert_then_select {
    ( $txn:expr, $entity_module:ident, $active_model:expr, [ $( ($column:ident, $value:expr) ),+ $(,)? ] ) => {
        {
            let result: Result<_, sea_orm::DbErr> = $entity_module::Entity::insert($active_model.clone())
                .on_conflict(sea_orm::sea_query::OnConflict::new().do_nothing().to_owned())
                .exec($txn)
                .await;

            match result {
                Ok(res) => {
                    let last_insert_id = res.last_insert_id;
                    let model = $entity_module::Entity::find_by_id(last_insert_id.clone())
                        .one($txn)
                        .await
                        .context(format!("select from \"{}\" by \"id\"", stringify!($entity_module)))?
                        .ok_or_else(|| anyhow::anyhow!(
                            "select from \"{}\" by \"id\"={:?} returned no data",
                            stringify!($entity_module),
                            last_insert_id
                        ))?;

                    Ok::<_, anyhow::Error>((model, true))
                }
                Err(sea_orm::DbErr::RecordNotInserted) => {
                    let model = $entity_module::Entity::find()
                        $(
                            .filter($entity_module::Column::$column.eq($value))
                        )*
                        .one($txn)
                        .await
                        .context(format!("select from \"{}\" by unique columns", stringify!($entity_module)))?
                        .ok_or_else(|| anyhow::anyhow!(
                            "select from \"{}\" by unique columns returned no data",
                            stringify!($entity_module)
                        ))?;

                    Ok((model, false))
                }
                Err(err) => Err(err).context(format!("insert into \"{}\"", stringify!($entity_module))),
            }
        }
    };
}

pub(crate) use insert_then_select;
