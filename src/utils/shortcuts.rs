#[macro_export]
macro_rules! create_set_status {
    ($resource_type:ident, $resource_status_type:ident, $fn_name:ident) => {
        /// Replace the status subresource, returning the object as stored by the API server
        #[instrument(skip(client))]
        pub async fn $fn_name(resource: &$resource_type, status: $resource_status_type, client: Client) -> Result<$resource_type, Error> {
            let api: Api<$resource_type> = Api::namespaced(
                client.clone(),
                &resource.meta().namespace.as_ref().expect("get resource namespace"),
            );
            let status_update = json!({
                "apiVersion": $resource_type::api_version(&()),
                "kind": $resource_type::kind(&()),
                "metadata": {
                    "name": resource.meta().name.as_ref().expect("get resource name"),
                    "resourceVersion": ResourceExt::resource_version(resource),
                },
                "status": status,
            });
            let updated = api
                .replace_status(
                    &resource.metadata.name.as_ref().expect("get resource name"),
                    &PostParams::default(),
                    serde_json::to_vec(&status_update)?,
                )
                .await?;
            Ok(updated)
        }
    };
}

#[macro_export]
macro_rules! ok_and_requeue {
    ($duration:expr) => {
        Ok(Action::requeue(Duration::from_secs($duration)))
    };
}

#[macro_export]
macro_rules! ok_no_requeue {
    () => {
        Ok(Action::await_change())
    };
}
