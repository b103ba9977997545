//! Manipulator management.
//!
//! A manipulator manager pairs a joint path (base link to end link) with the
//! body's inverse-kinematics handler. Managers are expensive to configure,
//! so they are memoized in the body's named cache; every failure mode
//! (invalid path, missing handler, too many joints) is an expected outcome
//! surfaced as `None` for the caller to check.

use std::sync::Arc;

use crate::body::{Body, Link};

/// Upper bound on the joints a manipulator configuration can describe.
pub const MAX_NUM_JOINTS: usize = 8;

/// Kinematic chain from a base link to an end link.
#[derive(Debug, Clone)]
pub struct JointPath {
    link_indices: Vec<usize>,
}

impl JointPath {
    /// Builds the chain by walking parent links from `end` up to `base`.
    /// Returns `None` when `end` does not descend from `base`.
    pub fn between(body: &Body, base: usize, end: usize) -> Option<JointPath> {
        let mut chain = vec![end];
        let mut current = end;
        while current != base {
            let link = body.link(current)?;
            current = link.parent_index()?;
            chain.push(current);
        }
        chain.reverse();
        Some(JointPath {
            link_indices: chain,
        })
    }

    /// Link indices from base to end, inclusive.
    pub fn link_indices(&self) -> &[usize] {
        &self.link_indices
    }

    pub fn base_index(&self) -> usize {
        self.link_indices[0]
    }

    pub fn end_index(&self) -> usize {
        self.link_indices[self.link_indices.len() - 1]
    }

    pub fn joint_count(&self) -> usize {
        self.link_indices.len().saturating_sub(1)
    }
}

/// Discrete solution-branch interface of an IK solver.
pub trait ConfigurationHandler: Send + Sync {
    fn current_configuration(&self) -> usize;

    fn configuration_name(&self, index: usize) -> String;
}

/// Inverse-kinematics boundary installed on a [`Body`] by the application.
pub trait KinematicsHandler: Send + Sync {
    /// Whether this handler can solve for the given chain.
    fn accepts(&self, body: &Body, path: &JointPath) -> bool;

    /// The handler's configuration-branch interface, when it has one.
    fn configuration_handler(&self) -> Option<&dyn ConfigurationHandler> {
        None
    }
}

/// Pairs a validated joint path with the body's IK handler, memoized per
/// (base, end) pair in the body cache.
pub struct ManipulatorManager {
    body: Arc<Body>,
    joint_path: JointPath,
    handler: Arc<dyn KinematicsHandler>,
}

impl ManipulatorManager {
    /// Returns the cached manager for the given chain, configuring a new one
    /// on first request.
    ///
    /// A missing base defaults to the root link; a missing end defaults to
    /// the unique end link (ambiguous trees have none). Returns `None` when
    /// the chain cannot be formed, the body has no IK handler, the handler
    /// rejects the chain, or the chain exceeds [`MAX_NUM_JOINTS`].
    pub fn get_or_create(
        body: &Arc<Body>,
        base: Option<&str>,
        end: Option<&str>,
    ) -> Option<Arc<ManipulatorManager>> {
        let base_link: &Arc<Link> = match base {
            Some(name) => body.find_link(name)?,
            None => body.root_link()?,
        };
        let end_link: &Arc<Link> = match end {
            Some(name) => body.find_link(name)?,
            None => body.find_unique_end_link()?,
        };

        let cache_name = format!("manipulator_{}_{}", base_link.name(), end_link.name());
        if let Some(manager) = body.find_cache::<ManipulatorManager>(&cache_name) {
            return Some(manager);
        }

        let joint_path = JointPath::between(body, base_link.index(), end_link.index())?;
        if joint_path.joint_count() > MAX_NUM_JOINTS {
            tracing::warn!(
                "Manipulator path {} -> {} has {} joints (limit {})",
                base_link.name(),
                end_link.name(),
                joint_path.joint_count(),
                MAX_NUM_JOINTS
            );
            return None;
        }
        let handler = body.ik_handler()?;
        if !handler.accepts(body, &joint_path) {
            return None;
        }

        let manager = Arc::new(ManipulatorManager {
            body: body.clone(),
            joint_path,
            handler,
        });
        body.set_cache(&cache_name, manager.clone());
        Some(manager)
    }

    pub fn body(&self) -> &Arc<Body> {
        &self.body
    }

    pub fn joint_path(&self) -> &JointPath {
        &self.joint_path
    }

    /// The current IK solution branch, or 0 when the handler exposes none.
    pub fn current_configuration(&self) -> usize {
        self.handler
            .configuration_handler()
            .map_or(0, |h| h.current_configuration())
    }

    /// Human-readable name of a solution branch, or an empty string when the
    /// handler exposes none.
    pub fn configuration_name(&self, index: usize) -> String {
        self.handler
            .configuration_handler()
            .map_or_else(String::new, |h| h.configuration_name(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{Body, Link};

    struct ElbowHandler;

    impl ConfigurationHandler for ElbowHandler {
        fn current_configuration(&self) -> usize {
            1
        }

        fn configuration_name(&self, index: usize) -> String {
            match index {
                0 => "elbow-up".to_string(),
                _ => "elbow-down".to_string(),
            }
        }
    }

    struct AcceptAllHandler;

    impl KinematicsHandler for AcceptAllHandler {
        fn accepts(&self, _body: &Body, _path: &JointPath) -> bool {
            true
        }

        fn configuration_handler(&self) -> Option<&dyn ConfigurationHandler> {
            Some(&ElbowHandler)
        }
    }

    fn chain_body(length: usize) -> Arc<Body> {
        let mut body = Body::new("chain");
        body.add_link(Link::new("link0"));
        for i in 1..length {
            body.add_link(Link::new(format!("link{i}")).with_parent(i - 1));
        }
        Arc::new(body)
    }

    #[test]
    fn test_joint_path_walks_parent_chain() {
        let body = chain_body(4);
        let path = JointPath::between(&body, 0, 3).unwrap();
        assert_eq!(path.link_indices(), &[0, 1, 2, 3]);
        assert_eq!(path.joint_count(), 3);

        // A path against the parent direction cannot be formed.
        assert!(JointPath::between(&body, 3, 0).is_none());
    }

    #[test]
    fn test_get_or_create_returns_cached_manager() {
        let body = chain_body(4);
        body.set_ik_handler(Arc::new(AcceptAllHandler));

        let first = ManipulatorManager::get_or_create(&body, None, None).unwrap();
        let second = ManipulatorManager::get_or_create(&body, None, None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.joint_path().joint_count(), 3);
        assert_eq!(first.current_configuration(), 1);
        assert_eq!(first.configuration_name(0), "elbow-up");
    }

    #[test]
    fn test_missing_handler_yields_none() {
        let body = chain_body(3);
        assert!(ManipulatorManager::get_or_create(&body, None, None).is_none());
    }

    #[test]
    fn test_joint_count_over_limit_yields_none() {
        let body = chain_body(MAX_NUM_JOINTS + 2);
        body.set_ik_handler(Arc::new(AcceptAllHandler));
        assert!(ManipulatorManager::get_or_create(&body, None, None).is_none());
    }

    #[test]
    fn test_ambiguous_end_link_yields_none() {
        let mut body = Body::new("forked");
        body.add_link(Link::new("base"));
        body.add_link(Link::new("left").with_parent(0));
        body.add_link(Link::new("right").with_parent(0));
        let body = Arc::new(body);
        body.set_ik_handler(Arc::new(AcceptAllHandler));

        assert!(ManipulatorManager::get_or_create(&body, None, None).is_none());
        // Naming the end link explicitly resolves the ambiguity.
        assert!(ManipulatorManager::get_or_create(&body, None, Some("left")).is_some());
    }
}
