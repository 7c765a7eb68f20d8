//! Transform facade
//!
//! [`Object3D`] holds position, Euler rotation (or an explicit quaternion),
//! scale and visibility, and composes the local matrix. It is embedded by
//! every facade kind with the [`TRANSFORM`](crate::facade::TRANSFORM)
//! capability; [`Object3DFacade`] is the plain version, also registered as
//! the `Group` kind.

use std::any::Any;

use serde_json::{json, Value};

use crate::facade::{
    expect_bool, expect_f64, expect_str, ChangeCategory, Facade, FacadeKind, PropertyError,
    TRANSFORM,
};
use crate::math::{Mat4, Quat, RotationOrder, Vec3};

/// Plain transform node
pub const OBJECT_3D: FacadeKind = FacadeKind::new("Object3D", Object3DFacade::construct, &[TRANSFORM]);

/// Alias of [`OBJECT_3D`] used for grouping
pub const GROUP: FacadeKind = FacadeKind::new("Group", Object3DFacade::construct, &[TRANSFORM]);

/// Names of the transform properties
pub const TRANSFORM_PROPERTIES: &[&str] = &[
    "x",
    "y",
    "z",
    "rotate_x",
    "rotate_y",
    "rotate_z",
    "rotate_order",
    "quaternion",
    "scale",
    "scale_x",
    "scale_y",
    "scale_z",
    "visible",
];

#[derive(Clone, Debug, PartialEq)]
pub struct Object3D {
    pub position: Vec3,
    /// Euler angles in radians
    pub rotation: Vec3,
    pub rotate_order: RotationOrder,
    /// Overrides the Euler rotation when set
    pub quaternion: Option<Quat>,
    pub scale: Vec3,
    pub visible: bool,
}

impl Default for Object3D {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            rotate_order: RotationOrder::Xyz,
            quaternion: None,
            scale: Vec3::ONE,
            visible: true,
        }
    }
}

impl Object3D {
    pub fn is_property(name: &str) -> bool {
        TRANSFORM_PROPERTIES.contains(&name)
    }

    pub fn orientation(&self) -> Quat {
        match self.quaternion {
            Some(q) => q,
            None => Quat::from_euler(
                self.rotation.x,
                self.rotation.y,
                self.rotation.z,
                self.rotate_order,
            ),
        }
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::compose(self.position, self.orientation(), self.scale)
    }

    pub fn set_property(&mut self, name: &str, value: &Value) -> Result<ChangeCategory, PropertyError> {
        match name {
            "x" => self.position.x = expect_f64(value)?,
            "y" => self.position.y = expect_f64(value)?,
            "z" => self.position.z = expect_f64(value)?,
            "rotate_x" => self.rotation.x = expect_f64(value)?,
            "rotate_y" => self.rotation.y = expect_f64(value)?,
            "rotate_z" => self.rotation.z = expect_f64(value)?,
            "rotate_order" => {
                let text = expect_str(value)?;
                self.rotate_order = RotationOrder::parse(text)
                    .ok_or_else(|| PropertyError::expected("a rotation order like \"XYZ\"", value))?;
            }
            "quaternion" => {
                self.quaternion = match value {
                    Value::Null => None,
                    other => {
                        let parts: [f64; 4] = serde_json::from_value(other.clone())
                            .map_err(|_| PropertyError::expected("[x, y, z, w]", value))?;
                        Some(Quat::new(parts[0], parts[1], parts[2], parts[3]).normalize())
                    }
                };
            }
            "scale" => self.scale = Vec3::splat(expect_f64(value)?),
            "scale_x" => self.scale.x = expect_f64(value)?,
            "scale_y" => self.scale.y = expect_f64(value)?,
            "scale_z" => self.scale.z = expect_f64(value)?,
            "visible" => {
                self.visible = expect_bool(value)?;
                return Ok(ChangeCategory::visual());
            }
            _ => return Err(PropertyError::Unknown),
        }
        Ok(ChangeCategory::transform())
    }

    pub fn property(&self, name: &str) -> Option<Value> {
        let value = match name {
            "x" => json!(self.position.x),
            "y" => json!(self.position.y),
            "z" => json!(self.position.z),
            "rotate_x" => json!(self.rotation.x),
            "rotate_y" => json!(self.rotation.y),
            "rotate_z" => json!(self.rotation.z),
            "rotate_order" => json!(self.rotate_order.as_str()),
            "quaternion" => match self.quaternion {
                Some(q) => json!(q.to_array()),
                None => Value::Null,
            },
            "scale" => {
                let s = self.scale;
                if s.x == s.y && s.y == s.z {
                    json!(s.x)
                } else {
                    return None;
                }
            }
            "scale_x" => json!(self.scale.x),
            "scale_y" => json!(self.scale.y),
            "scale_z" => json!(self.scale.z),
            "visible" => json!(self.visible),
            _ => return None,
        };
        Some(value)
    }
}

/// Facade that is nothing but a transform
#[derive(Debug, Default)]
pub struct Object3DFacade {
    pub object: Object3D,
}

impl Object3DFacade {
    fn construct() -> Box<dyn Facade> {
        Box::<Object3DFacade>::default()
    }
}

impl Facade for Object3DFacade {
    fn set_property(&mut self, name: &str, value: &Value) -> Result<ChangeCategory, PropertyError> {
        self.object.set_property(name, value)
    }

    fn property(&self, name: &str) -> Option<Value> {
        self.object.property(name)
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
