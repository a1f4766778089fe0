//! Task identity handed to the worker by the platform

use crate::config::Config;
use crate::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Identity of the current task, immutable for the life of the process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskContext {
    task_id: String,
    spider_id: String,
    node_id: String,
    schedule_id: String,
    param: String,
}

impl TaskContext {
    /// Build a context from explicit values
    pub fn new(
        task_id: impl Into<String>,
        spider_id: impl Into<String>,
        node_id: impl Into<String>,
        schedule_id: impl Into<String>,
        param: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            spider_id: spider_id.into(),
            node_id: node_id.into(),
            schedule_id: schedule_id.into(),
            param: param.into(),
        }
    }

    /// Read the context from the process environment
    pub fn from_env() -> Self {
        Self::from(&Config::from_env())
    }

    /// Task id
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Spider id
    pub fn spider_id(&self) -> &str {
        &self.spider_id
    }

    /// Worker node id
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Schedule id (empty for manually started tasks)
    pub fn schedule_id(&self) -> &str {
        &self.schedule_id
    }

    /// Raw parameter string
    pub fn param(&self) -> &str {
        &self.param
    }

    /// Decode the parameter string as JSON
    ///
    /// An empty parameter is an error, not a default value.
    ///
    /// ```
    /// use crawlab_sdk::context::TaskContext;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct Params {
    ///     pages: u32,
    /// }
    ///
    /// let ctx = TaskContext::new("t", "s", "n", "", r#"{"pages": 3}"#);
    /// let params: Params = ctx.parse_param().unwrap();
    /// assert_eq!(params.pages, 3);
    /// ```
    pub fn parse_param<T: DeserializeOwned>(&self) -> Result<T> {
        if self.param.is_empty() {
            return Err(Error::EmptyParam);
        }
        serde_json::from_str(&self.param).map_err(Error::ParamDecode)
    }
}

impl From<&Config> for TaskContext {
    fn from(config: &Config) -> Self {
        Self {
            task_id: config.task_id.clone(),
            spider_id: config.spider_id.clone(),
            node_id: config.node_id.clone(),
            schedule_id: config.schedule_id.clone(),
            param: config.param.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Params {
        keyword: String,
        #[serde(default)]
        pages: u32,
    }

    #[test]
    fn parses_structured_params() {
        let ctx = TaskContext::new("t1", "s1", "n1", "", r#"{"keyword":"rust","pages":2}"#);
        let params: Params = tokio_test::assert_ok!(ctx.parse_param());
        assert_eq!(
            params,
            Params {
                keyword: "rust".into(),
                pages: 2
            }
        );
    }

    #[test]
    fn empty_param_is_a_reportable_failure() {
        let ctx = TaskContext::new("t1", "s1", "n1", "", "");
        let err = tokio_test::assert_err!(ctx.parse_param::<Params>());
        assert!(matches!(err, Error::EmptyParam));
    }

    #[test]
    fn malformed_param_reports_decode_error() {
        let ctx = TaskContext::new("t1", "s1", "n1", "", "{not json");
        let err = tokio_test::assert_err!(ctx.parse_param::<Params>());
        assert!(matches!(err, Error::ParamDecode(_)));
    }

    #[test]
    fn built_from_config_identity() {
        let config = Config {
            task_id: "task".into(),
            spider_id: "spider".into(),
            node_id: "node".into(),
            schedule_id: "schedule".into(),
            param: "[]".into(),
            ..Config::default()
        };
        let ctx = TaskContext::from(&config);

        assert_eq!(ctx.task_id(), "task");
        assert_eq!(ctx.spider_id(), "spider");
        assert_eq!(ctx.node_id(), "node");
        assert_eq!(ctx.schedule_id(), "schedule");
        assert_eq!(ctx.param(), "[]");
        let empty: Vec<u8> = tokio_test::assert_ok!(ctx.parse_param());
        assert!(empty.is_empty());
    }
}
