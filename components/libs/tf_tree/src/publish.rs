//! Conversion of scene interactions (clicked points, goal poses) into outgoing messages.

use crate::tree::TransformTree;
use crate::FrameIdString;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tf_clock::TfTime;
use tf_spatial_payloads::{DVec3, Pose, RigidTransform};

/// The interactions that can be published from the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublishKind {
    Point,
    Pose,
    PoseEstimate,
}

impl PublishKind {
    pub fn default_topic(&self) -> &'static str {
        match self {
            PublishKind::Point => "/clicked_point",
            PublishKind::Pose => "/move_base_simple/goal",
            PublishKind::PoseEstimate => "/initialpose",
        }
    }

    pub fn schema_name(&self) -> &'static str {
        match self {
            PublishKind::Point => "geometry_msgs/PointStamped",
            PublishKind::Pose => "geometry_msgs/PoseStamped",
            PublishKind::PoseEstimate => "geometry_msgs/PoseWithCovarianceStamped",
        }
    }
}

/// Row-major 6x6 covariance over x, y, z, roll, pitch and yaw.
pub type Covariance = [[f64; 6]; 6];

/// Standard deviations attached to a published pose estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseDeviation {
    /// Metres.
    pub x: f64,
    /// Metres.
    pub y: f64,
    /// Radians around z.
    pub theta: f64,
}

impl PoseDeviation {
    /// Only the planar terms are set, every other variance and all correlations are zero.
    pub fn covariance(&self) -> Covariance {
        let mut covariance = [[0.0; 6]; 6];
        covariance[0][0] = self.x.powi(2);
        covariance[1][1] = self.y.powi(2);
        covariance[5][5] = self.theta.powi(2);
        covariance
    }
}

impl Default for PoseDeviation {
    fn default() -> Self {
        Self {
            x: 0.5,
            y: 0.5,
            theta: std::f64::consts::PI / 12.0,
        }
    }
}

/// A pose stamped with the frame and time it is expressed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseInFrame {
    pub timestamp: TfTime,
    pub frame_id: FrameIdString,
    pub pose: Pose,
    /// Set on pose estimates only.
    pub covariance: Option<Covariance>,
}

fn to_publish_frame(
    tree: &TransformTree,
    pose: &Pose,
    render_frame: &str,
    publish_frame: &str,
    current_time: TfTime,
) -> Option<Pose> {
    // the render frame is the fixed frame, both ends are sampled now
    match tree.apply(
        pose,
        publish_frame,
        render_frame,
        render_frame,
        current_time,
        current_time,
    ) {
        Ok(converted) => Some(converted),
        Err(e) => {
            warn!("Unable to transform from '{render_frame}' to '{publish_frame}': {e}");
            None
        }
    }
}

/// Expresses a point picked in the render frame in the publish frame.
/// On failure the point is returned unchanged.
pub fn point_to_publish_frame(
    tree: &TransformTree,
    point: DVec3,
    render_frame: &str,
    publish_frame: &str,
    current_time: TfTime,
) -> DVec3 {
    to_publish_frame(
        tree,
        &RigidTransform::from_translation(point),
        render_frame,
        publish_frame,
        current_time,
    )
    .map_or(point, |pose| pose.translation)
}

/// Expresses a pose picked in the render frame in the publish frame.
/// On failure the pose is returned unchanged.
pub fn pose_to_publish_frame(
    tree: &TransformTree,
    pose: Pose,
    render_frame: &str,
    publish_frame: &str,
    current_time: TfTime,
) -> Pose {
    to_publish_frame(tree, &pose, render_frame, publish_frame, current_time).unwrap_or(pose)
}

/// Builds the message for an interaction, the publish frame defaults to the render frame.
///
/// Clicked points lie on the ground plane of the publish frame. Pose estimates carry the
/// covariance of `deviation`.
pub fn publish_message(
    tree: &TransformTree,
    kind: PublishKind,
    picked: Pose,
    render_frame: &str,
    publish_frame: Option<&str>,
    deviation: &PoseDeviation,
    current_time: TfTime,
) -> PoseInFrame {
    let frame_id = publish_frame.unwrap_or(render_frame);
    let (pose, covariance) = match kind {
        // a point carries no orientation
        PublishKind::Point => {
            let point = point_to_publish_frame(
                tree,
                picked.translation,
                render_frame,
                frame_id,
                current_time,
            );
            (RigidTransform::from_translation(point.with_z(0.0)), None)
        }
        PublishKind::Pose => (
            pose_to_publish_frame(tree, picked, render_frame, frame_id, current_time),
            None,
        ),
        PublishKind::PoseEstimate => (
            pose_to_publish_frame(tree, picked, render_frame, frame_id, current_time),
            Some(deviation.covariance()),
        ),
    };
    PoseInFrame {
        timestamp: current_time,
        frame_id: frame_id.into(),
        pose,
        covariance,
    }
}

/// The transport the topics are announced on.
pub trait Advertiser {
    fn advertise(&mut self, topic: &str, schema_name: &str);
    fn unadvertise(&mut self, topic: &str);
}

/// Reference counted topic advertisements of a session.
///
/// Several tools may publish on the same topic, the transport only sees the first
/// advertisement and the last release.
#[derive(Debug, Default)]
pub struct AdvertisementRegistry {
    references: HashMap<String, usize>,
}

impl AdvertisementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the reference count after the call.
    pub fn advertise(
        &mut self,
        topic: &str,
        schema_name: &str,
        advertiser: &mut impl Advertiser,
    ) -> usize {
        let count = self.references.entry(topic.to_string()).or_insert(0);
        if *count == 0 {
            debug!("Advertising {topic} as {schema_name}");
            advertiser.advertise(topic, schema_name);
        }
        *count += 1;
        *count
    }

    /// Returns the reference count after the call.
    pub fn unadvertise(&mut self, topic: &str, advertiser: &mut impl Advertiser) -> usize {
        let Some(count) = self.references.get_mut(topic) else {
            debug!("Ignoring release of {topic} which is not advertised");
            return 0;
        };
        *count -= 1;
        let remaining = *count;
        if remaining == 0 {
            self.references.remove(topic);
            debug!("Unadvertising {topic}");
            advertiser.unadvertise(topic);
        }
        remaining
    }

    pub fn reference_count(&self, topic: &str) -> usize {
        self.references.get(topic).copied().unwrap_or(0)
    }

    pub fn is_advertised(&self, topic: &str) -> bool {
        self.references.contains_key(topic)
    }

    /// Releases every topic at once, e.g. when the session ends.
    pub fn unadvertise_all(&mut self, advertiser: &mut impl Advertiser) {
        for (topic, _) in self.references.drain() {
            advertiser.unadvertise(&topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::translation;
    use std::f64::consts::FRAC_PI_2;
    use tf_spatial_payloads::DQuat;

    #[derive(Default)]
    struct Transport {
        events: Vec<String>,
    }

    impl Advertiser for Transport {
        fn advertise(&mut self, topic: &str, schema_name: &str) {
            self.events.push(format!("+{topic} {schema_name}"));
        }

        fn unadvertise(&mut self, topic: &str) {
            self.events.push(format!("-{topic}"));
        }
    }

    fn tree() -> TransformTree {
        let mut tree = TransformTree::new();
        tree.add_static_transform(
            "map",
            "base_link",
            RigidTransform::new(DVec3::new(2.0, 0.0, 0.0), DQuat::from_rotation_z(FRAC_PI_2)),
        )
        .unwrap();
        tree
    }

    #[test]
    fn test_point_to_publish_frame() {
        let tree = tree();
        let point = point_to_publish_frame(
            &tree,
            DVec3::new(2.0, 1.0, 0.0),
            "map",
            "base_link",
            TfTime::from_secs(1),
        );
        assert_abs_diff_eq!(point.x, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(point.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_failed_conversion_returns_input() {
        let tree = tree();
        let pose = translation(1.0, 2.0, 3.0);
        let out = pose_to_publish_frame(&tree, pose, "map", "unknown", TfTime::from_secs(1));
        assert_eq!(out, pose);
    }

    #[test]
    fn test_publish_message_defaults_to_render_frame() {
        let tree = tree();
        let picked = RigidTransform::new(DVec3::new(1.0, 1.0, 0.0), DQuat::from_rotation_z(0.3));
        let msg = publish_message(
            &tree,
            PublishKind::Pose,
            picked,
            "map",
            None,
            &PoseDeviation::default(),
            TfTime::from_secs(3),
        );
        assert_eq!(msg.frame_id.as_str(), "map");
        assert_eq!(msg.timestamp, TfTime::from_secs(3));
        assert_eq!(msg.pose, picked);
        assert_eq!(msg.covariance, None);

        let msg = publish_message(
            &tree,
            PublishKind::Point,
            picked,
            "map",
            Some("base_link"),
            &PoseDeviation::default(),
            TfTime::from_secs(3),
        );
        assert_eq!(msg.frame_id.as_str(), "base_link");
        assert_eq!(msg.pose.rotation, DQuat::IDENTITY);
        assert_abs_diff_eq!(msg.pose.translation.x, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(msg.pose.translation.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_clicked_point_is_on_the_ground_plane() {
        let tree = tree();
        let msg = publish_message(
            &tree,
            PublishKind::Point,
            translation(1.0, 2.0, 3.0),
            "map",
            None,
            &PoseDeviation::default(),
            TfTime::from_secs(1),
        );
        assert_eq!(msg.pose.translation, DVec3::new(1.0, 2.0, 0.0));
        assert_eq!(msg.covariance, None);

        let lifted = RigidTransform::new(DVec3::new(2.0, 1.0, 4.0), DQuat::from_rotation_x(0.2));
        let msg = publish_message(
            &tree,
            PublishKind::Point,
            lifted,
            "map",
            Some("base_link"),
            &PoseDeviation::default(),
            TfTime::from_secs(1),
        );
        assert_abs_diff_eq!(msg.pose.translation.x, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(msg.pose.translation.y, 0.0, epsilon = 1e-9);
        assert_eq!(msg.pose.translation.z, 0.0);
    }

    #[test]
    fn test_pose_estimate_carries_covariance() {
        let tree = tree();
        let deviation = PoseDeviation {
            x: 0.5,
            y: 2.0,
            theta: 0.1,
        };
        let picked = RigidTransform::new(DVec3::new(1.0, 1.0, 0.5), DQuat::from_rotation_z(0.3));
        let msg = publish_message(
            &tree,
            PublishKind::PoseEstimate,
            picked,
            "map",
            None,
            &deviation,
            TfTime::from_secs(2),
        );
        assert_eq!(msg.pose, picked);
        let covariance = msg.covariance.unwrap();
        assert_eq!(covariance[0][0], 0.25);
        assert_eq!(covariance[1][1], 4.0);
        assert_abs_diff_eq!(covariance[5][5], 0.01, epsilon = 1e-15);
        let non_zero = covariance.iter().flatten().filter(|v| **v != 0.0).count();
        assert_eq!(non_zero, 3);
    }

    #[test]
    fn test_pose_deviation_from_ron() {
        let deviation: PoseDeviation = ron::from_str("(theta: 0.2)").unwrap();
        assert_eq!(deviation.x, 0.5);
        assert_eq!(deviation.y, 0.5);
        assert_eq!(deviation.theta, 0.2);
        let default = PoseDeviation::default().covariance();
        assert_abs_diff_eq!(default[5][5], (std::f64::consts::PI / 12.0).powi(2));
    }

    #[test]
    fn test_default_topics() {
        assert_eq!(PublishKind::Point.default_topic(), "/clicked_point");
        assert_eq!(PublishKind::Pose.default_topic(), "/move_base_simple/goal");
        assert_eq!(PublishKind::PoseEstimate.default_topic(), "/initialpose");
    }

    #[test]
    fn test_advertisement_reference_counting() {
        let mut registry = AdvertisementRegistry::new();
        let mut transport = Transport::default();
        let topic = PublishKind::Point.default_topic();
        let schema = PublishKind::Point.schema_name();

        assert_eq!(registry.advertise(topic, schema, &mut transport), 1);
        assert_eq!(registry.advertise(topic, schema, &mut transport), 2);
        assert_eq!(registry.unadvertise(topic, &mut transport), 1);
        assert!(registry.is_advertised(topic));
        assert_eq!(registry.unadvertise(topic, &mut transport), 0);
        assert_eq!(registry.unadvertise(topic, &mut transport), 0);
        assert!(!registry.is_advertised(topic));

        assert_eq!(
            transport.events,
            vec!["+/clicked_point geometry_msgs/PointStamped", "-/clicked_point"]
        );
    }

    #[test]
    fn test_unadvertise_all() {
        let mut registry = AdvertisementRegistry::new();
        let mut transport = Transport::default();
        registry.advertise("/a", "s", &mut transport);
        registry.advertise("/a", "s", &mut transport);
        registry.unadvertise_all(&mut transport);
        assert_eq!(registry.reference_count("/a"), 0);
        assert_eq!(transport.events, vec!["+/a s", "-/a"]);
    }
}
