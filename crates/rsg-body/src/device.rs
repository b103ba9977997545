//! Devices and their scene representations.
//!
//! A device (light, sensor, gripper indicator) belongs to a kinematic link
//! and exposes a state-change signal. Its visual representation is built by
//! a factory registered per concrete device type; device types with no
//! registered factory simply have no scene presence.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use rsg_core::{
    Children, CloneMap, Connection, NodeRef, SceneNode, SceneShape, Update, UpdateFlags,
    UpdateSignal, generate_sphere_mesh,
};

/// Kinematic-model boundary for devices.
pub trait Device: Any + Send + Sync {
    fn name(&self) -> &str;

    /// Index of the link this device is mounted on.
    fn link_index(&self) -> usize;

    /// Emitted whenever the device's state changes.
    fn state_changed(&self) -> &UpdateSignal;

    fn as_any(&self) -> &dyn Any;
}

/// Identity comparison for device handles.
pub fn device_ptr_eq(a: &Arc<dyn Device>, b: &Arc<dyn Device>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Closure refreshing a device visual from the device state at a given time.
pub type SceneDeviceUpdate = Arc<dyn Fn(f64) + Send + Sync>;

type DeviceVisualFactory =
    Box<dyn Fn(&Arc<dyn Device>) -> Option<(NodeRef, Option<SceneDeviceUpdate>)> + Send + Sync>;

/// Process-wide table from concrete device type to visual factory.
pub struct DeviceVisualRegistry {
    factories: RwLock<HashMap<TypeId, DeviceVisualFactory>>,
}

impl DeviceVisualRegistry {
    pub fn instance() -> &'static DeviceVisualRegistry {
        static INSTANCE: OnceLock<DeviceVisualRegistry> = OnceLock::new();
        INSTANCE.get_or_init(|| DeviceVisualRegistry {
            factories: RwLock::new(HashMap::new()),
        })
    }

    /// Registers (or replaces) the visual factory for device type `D`.
    pub fn register<D: Device>(
        &self,
        factory: impl Fn(&Arc<dyn Device>) -> Option<(NodeRef, Option<SceneDeviceUpdate>)>
        + Send
        + Sync
        + 'static,
    ) {
        self.factories
            .write()
            .insert(TypeId::of::<D>(), Box::new(factory));
    }

    fn create_visual(
        &self,
        device: &Arc<dyn Device>,
    ) -> Option<(NodeRef, Option<SceneDeviceUpdate>)> {
        let factories = self.factories.read();
        let factory = factories.get(&device.as_any().type_id())?;
        factory(device)
    }
}

/// Scene node representing one device.
pub struct SceneDevice {
    name: String,
    children: Children,
    device: Arc<dyn Device>,
    update_fn: Option<SceneDeviceUpdate>,
    state_connection: Option<Connection>,
}

impl SceneDevice {
    /// Builds the scene device for `device` through the registered factory.
    /// Returns `None` when the device type has no visual representation.
    pub fn create(device: &Arc<dyn Device>) -> Option<NodeRef> {
        let (visual, update_fn) = DeviceVisualRegistry::instance().create_visual(device)?;
        let node = NodeRef::new(SceneDevice {
            name: device.name().to_string(),
            children: Children::new(),
            device: device.clone(),
            update_fn,
            state_connection: None,
        });
        node.add_child(&visual);
        Some(node)
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Refreshes the visual from the device state at simulation time `time`.
    pub fn update_scene(&self, time: f64) {
        if let Some(update) = &self.update_fn {
            update(time);
        }
    }

    /// Connects or disconnects the device's state signal from the visual
    /// refresh, so state changes repaint automatically during simulation.
    pub fn set_scene_update_connection(node: &NodeRef, on: bool) {
        let hooks = node
            .downcast_read::<SceneDevice>()
            .map(|sdev| (sdev.device.clone(), sdev.update_fn.clone()));
        let Some((device, update_fn)) = hooks else {
            return;
        };

        let connection = match (on, update_fn) {
            (true, Some(update)) => Some(
                device
                    .state_changed()
                    .connect(move |_| update(0.0)),
            ),
            _ => None,
        };
        if let Some(mut sdev) = node.downcast_write::<SceneDevice>() {
            sdev.state_connection = connection;
        }
    }
}

impl SceneNode for SceneDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn children(&self) -> Option<&Children> {
        Some(&self.children)
    }

    fn children_mut(&mut self) -> Option<&mut Children> {
        Some(&mut self.children)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_node(&self, map: &mut CloneMap) -> NodeRef {
        // The refresh closure is bound to the original visual nodes; a clone
        // gets a static snapshot until recreated through the factory.
        let clone = NodeRef::new(SceneDevice {
            name: self.name.clone(),
            children: Children::new(),
            device: self.device.clone(),
            update_fn: None,
            state_connection: None,
        });
        for child in self.children.iter() {
            let child_clone = map.get_clone(child);
            clone.add_child(&child_clone);
        }
        clone
    }
}

/// A switchable light mounted on a link.
pub struct LightDevice {
    name: String,
    link_index: usize,
    state: RwLock<LightState>,
    signal: UpdateSignal,
}

struct LightState {
    on: bool,
    color: [f32; 3],
}

impl LightDevice {
    pub fn new(name: impl Into<String>, link_index: usize) -> Self {
        Self {
            name: name.into(),
            link_index,
            state: RwLock::new(LightState {
                on: true,
                color: [1.0, 1.0, 0.8],
            }),
            signal: UpdateSignal::new(),
        }
    }

    pub fn is_on(&self) -> bool {
        self.state.read().on
    }

    pub fn set_on(&self, on: bool) {
        {
            self.state.write().on = on;
        }
        self.signal.emit(&Update::modified());
    }

    pub fn color(&self) -> [f32; 3] {
        self.state.read().color
    }

    pub fn set_color(&self, color: [f32; 3]) {
        {
            self.state.write().color = color;
        }
        self.signal.emit(&Update::modified());
    }

    fn marker_color(&self) -> [f32; 4] {
        let [r, g, b] = self.color();
        if self.is_on() {
            [r, g, b, 1.0]
        } else {
            [r * 0.2, g * 0.2, b * 0.2, 1.0]
        }
    }
}

impl Device for LightDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn link_index(&self) -> usize {
        self.link_index
    }

    fn state_changed(&self) -> &UpdateSignal {
        &self.signal
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Installs the visual factory for [`LightDevice`]: a small sphere marker
/// recolored from the light state. Call once during startup; safe to call
/// repeatedly.
pub fn register_light_device_visual() {
    DeviceVisualRegistry::instance().register::<LightDevice>(|device| {
        let light = device.as_any().downcast_ref::<LightDevice>()?;
        let mesh = Arc::new(generate_sphere_mesh(0.02, 12, 6));
        let visual = NodeRef::new(
            SceneShape::new(mesh).with_color(light.marker_color()),
        );

        let device = device.clone();
        let marker = visual.clone();
        let update: SceneDeviceUpdate = Arc::new(move |_time| {
            let Some(light) = device.as_any().downcast_ref::<LightDevice>() else {
                return;
            };
            let color = light.marker_color();
            if let Some(mut shape) = marker.downcast_write::<SceneShape>() {
                shape.set_color(color);
            }
            marker.notify_update(UpdateFlags::MODIFIED);
        });

        Some((visual, Some(update)))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_device_has_no_scene_presence() {
        struct SilentDevice {
            signal: UpdateSignal,
        }
        impl Device for SilentDevice {
            fn name(&self) -> &str {
                "silent"
            }
            fn link_index(&self) -> usize {
                0
            }
            fn state_changed(&self) -> &UpdateSignal {
                &self.signal
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        let device: Arc<dyn Device> = Arc::new(SilentDevice {
            signal: UpdateSignal::new(),
        });
        assert!(SceneDevice::create(&device).is_none());
    }

    #[test]
    fn test_light_visual_tracks_state_through_connection() {
        register_light_device_visual();
        let light = Arc::new(LightDevice::new("lamp", 0));
        let device: Arc<dyn Device> = light.clone();

        let node = SceneDevice::create(&device).unwrap();
        SceneDevice::set_scene_update_connection(&node, true);

        let marker = node.child(0).unwrap();
        let lit = marker.downcast_read::<SceneShape>().unwrap().color();
        assert_eq!(lit[3], 1.0);

        light.set_on(false);
        let dimmed = marker.downcast_read::<SceneShape>().unwrap().color();
        assert!(dimmed[0] < lit[0]);

        // Disconnecting stops the refresh.
        SceneDevice::set_scene_update_connection(&node, false);
        light.set_on(true);
        let stale = marker.downcast_read::<SceneShape>().unwrap().color();
        assert_eq!(stale, dimmed);
    }
}
