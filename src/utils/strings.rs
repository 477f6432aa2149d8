use crate::OPERATOR_NAME;

pub fn get_version_string() -> String {
    format!("{}-{}", env!("GIT_COUNT"), env!("GIT_HASH"))
}

pub fn field_manager(controller: &str) -> String {
    format!("{OPERATOR_NAME}.{controller}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_manager_is_prefixed_with_operator_name() {
        assert_eq!(field_manager("deployment"), "kvm-operator.deployment");
    }
}
