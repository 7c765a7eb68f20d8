//! List facade
//!
//! A list node expands its [`ListTemplate`](crate::ListTemplate) into one
//! child per data element. Children are keyed by the template's key
//! extractor, so an element that keeps its key keeps its facade instance,
//! and the children follow the order of the new data.

use std::any::Any;

use serde_json::Value;

use crate::facade::{ChangeCategory, Facade, FacadeKind, PropertyError};

pub const LIST: FacadeKind = FacadeKind::new("List", ListFacade::construct, &[]);

/// Container for list-expanded children; has no properties of its own
#[derive(Debug, Default)]
pub struct ListFacade;

impl ListFacade {
    fn construct() -> Box<dyn Facade> {
        Box::new(ListFacade)
    }
}

impl Facade for ListFacade {
    fn set_property(&mut self, _name: &str, _value: &Value) -> Result<ChangeCategory, PropertyError> {
        Err(PropertyError::Unknown)
    }

    fn property(&self, _name: &str) -> Option<Value> {
        None
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
