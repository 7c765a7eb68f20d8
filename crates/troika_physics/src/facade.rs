//! Physics object facade
//!
//! An [`Object3D`] with a rigid body. Transform properties place the body;
//! while it is simulated the bridge writes the body's transform back into
//! the object every frame. Assigning a transform property through
//! reconciliation teleports the body.

use std::any::Any;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use troika_core::{
    Capability, ChangeCategory, Facade, FacadeKind, Object3D, PropertyError, TRANSFORM,
};

use crate::protocol::{ActivationState, BodyDesc, BodyType, Shape};

/// Kind owns a rigid body in the physics world
pub const PHYSICS_BODY: Capability = "physics_body";

pub const PHYSICS_OBJECT: FacadeKind = FacadeKind::new(
    "PhysicsObject",
    PhysicsObjectFacade::construct,
    &[TRANSFORM, PHYSICS_BODY],
);

/// Body properties; changing any of these outside [`LIVE_PROPERTIES`]
/// rebuilds the body
pub const PHYSICS_PROPERTIES: &[&str] = &[
    "body_type",
    "shape",
    "mass",
    "restitution",
    "friction",
    "linear_damping",
    "angular_damping",
    "gravity_scale",
    "can_sleep",
    "velocity",
    "angular_velocity",
    "activation",
];

/// Body properties applied to a live body without rebuilding it
pub const LIVE_PROPERTIES: &[&str] = &["velocity", "angular_velocity", "activation"];

#[derive(Debug, Default)]
pub struct PhysicsObjectFacade {
    pub object: Object3D,
    body: BodyDesc,
    activation: ActivationState,
}

fn parse<T: DeserializeOwned>(value: &Value) -> Result<T, PropertyError> {
    serde_json::from_value(value.clone()).map_err(|error| PropertyError::Invalid(error.to_string()))
}

fn to_value<T: Serialize>(value: T) -> Option<Value> {
    serde_json::to_value(value).ok()
}

fn non_negative(value: &Value) -> Result<f64, PropertyError> {
    let number: f64 = parse(value)?;
    if number < 0.0 {
        return Err(PropertyError::expected("a non-negative number", value));
    }
    Ok(number)
}

impl PhysicsObjectFacade {
    fn construct() -> Box<dyn Facade> {
        Box::<PhysicsObjectFacade>::default()
    }

    pub fn is_physics_property(name: &str) -> bool {
        PHYSICS_PROPERTIES.contains(&name)
    }

    pub fn activation(&self) -> ActivationState {
        self.activation
    }

    /// Body description at the object's current transform
    pub fn body_desc(&self) -> BodyDesc {
        BodyDesc {
            position: self.object.position.to_array(),
            quaternion: self.object.orientation().to_array(),
            ..self.body
        }
    }

    fn set_body_property(&mut self, name: &str, value: &Value) -> Result<(), PropertyError> {
        let body = &mut self.body;
        match name {
            "body_type" => body.body_type = parse::<BodyType>(value)?,
            "shape" => body.shape = parse::<Shape>(value)?,
            "mass" => {
                let mass: f64 = parse(value)?;
                if mass <= 0.0 {
                    return Err(PropertyError::expected("a positive mass", value));
                }
                body.mass = mass;
            }
            "restitution" => body.restitution = non_negative(value)?,
            "friction" => body.friction = non_negative(value)?,
            "linear_damping" => body.linear_damping = non_negative(value)?,
            "angular_damping" => body.angular_damping = non_negative(value)?,
            "gravity_scale" => body.gravity_scale = parse(value)?,
            "can_sleep" => body.can_sleep = parse(value)?,
            "velocity" => body.velocity = parse(value)?,
            "angular_velocity" => body.angular_velocity = parse(value)?,
            "activation" => self.activation = parse(value)?,
            _ => return Err(PropertyError::Unknown),
        }
        Ok(())
    }

    fn body_property(&self, name: &str) -> Option<Value> {
        let body = &self.body;
        match name {
            "body_type" => to_value(body.body_type),
            "shape" => to_value(body.shape),
            "mass" => to_value(body.mass),
            "restitution" => to_value(body.restitution),
            "friction" => to_value(body.friction),
            "linear_damping" => to_value(body.linear_damping),
            "angular_damping" => to_value(body.angular_damping),
            "gravity_scale" => to_value(body.gravity_scale),
            "can_sleep" => to_value(body.can_sleep),
            "velocity" => to_value(body.velocity),
            "angular_velocity" => to_value(body.angular_velocity),
            "activation" => to_value(self.activation),
            _ => None,
        }
    }
}

impl Facade for PhysicsObjectFacade {
    fn set_property(&mut self, name: &str, value: &Value) -> Result<ChangeCategory, PropertyError> {
        if Object3D::is_property(name) {
            return self.object.set_property(name, value);
        }
        self.set_body_property(name, value)?;
        Ok(ChangeCategory::none())
    }

    fn property(&self, name: &str) -> Option<Value> {
        if Object3D::is_property(name) {
            self.object.property(name)
        } else {
            self.body_property(name)
        }
    }

    fn object3d(&self) -> Option<&Object3D> {
        Some(&self.object)
    }

    fn object3d_mut(&mut self) -> Option<&mut Object3D> {
        Some(&mut self.object)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
