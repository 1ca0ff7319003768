//! # Reference Spaces
//!
//! The coordinate systems poses are reported in, and recentering.
//!
//! ## Plain English Explanation
//!
//! - The **head space** moves with the headset. Head-locked HUD quads live here.
//! - The **stage space** has its origin on the play-area floor.
//! - Runtimes without a stage get a **fake stage**: the seated "local" space
//!   shifted down by a standing eye height, so the floor ends up roughly
//!   where it should.
//!
//! Recentering turns the world so that "forward" is wherever the player is
//! looking now. We can't move the runtime's spaces, so we throw the stage
//! spaces away and create new ones rotated by the accumulated heading.

use ::openxr as xr;
use glam::{Quat, Vec3};
use log::info;

use crate::error::{VrError, VrResult};
use crate::math::{yaw_rotation, Pose};
use crate::runtime::{SpaceId, XrRuntime};

/// Height offset of the fake stage below the local space origin, in meters
pub const FAKE_STAGE_HEIGHT: f32 = -1.675;

/// The set of reference spaces, exactly one of which is current
#[derive(Debug)]
pub struct ReferenceSpaces {
    head: SpaceId,
    stage: Option<SpaceId>,
    fake_stage: Option<SpaceId>,
    current: Option<SpaceId>,
    stage_supported: bool,
    recenter_rotation: Quat,
    recenter_yaw: f32,
}

impl ReferenceSpaces {
    /// Creates the head space and checks for stage support.
    ///
    /// No stage space exists until the first [`recenter`](Self::recenter).
    pub fn new<R: XrRuntime + ?Sized>(runtime: &mut R) -> VrResult<Self> {
        let stage_supported = runtime
            .reference_space_types()?
            .contains(&xr::ReferenceSpaceType::STAGE);
        if stage_supported {
            info!("Stage space supported");
        } else {
            info!("Stage space not supported, using local space {} m down", -FAKE_STAGE_HEIGHT);
        }

        let head = runtime.create_reference_space(xr::ReferenceSpaceType::VIEW, Pose::IDENTITY)?;

        Ok(Self {
            head,
            stage: None,
            fake_stage: None,
            current: None,
            stage_supported,
            recenter_rotation: Quat::IDENTITY,
            recenter_yaw: 0.0,
        })
    }

    /// Head-locked space
    pub fn head(&self) -> SpaceId {
        self.head
    }

    /// World space everything is located in
    pub fn current(&self) -> VrResult<SpaceId> {
        self.current
            .ok_or_else(|| VrError::protocol("no current reference space; recenter first"))
    }

    /// Whether the runtime offers a real stage space
    pub fn stage_supported(&self) -> bool {
        self.stage_supported
    }

    /// Accumulated recenter heading in radians
    pub fn recenter_yaw(&self) -> f32 {
        self.recenter_yaw
    }

    /// Accumulated recenter rotation
    pub fn recenter_rotation(&self) -> Quat {
        self.recenter_rotation
    }

    /// Makes the current head heading the new forward.
    ///
    /// Without a display time (first initialisation) or a current space
    /// there is nothing to measure, and the spaces are rebuilt with the
    /// rotation accumulated so far.
    pub fn recenter<R: XrRuntime + ?Sized>(
        &mut self,
        runtime: &mut R,
        display_time: Option<xr::Time>,
    ) -> VrResult<()> {
        if let (Some(current), Some(time)) = (self.current, display_time) {
            let head = runtime.locate_space(self.head, current, time)?;
            let yaw = head.yaw();
            self.recenter_yaw += yaw;
            self.recenter_rotation = (self.recenter_rotation * yaw_rotation(yaw)).normalize();
            info!(
                "Recentering by {:.1} deg (total {:.1} deg)",
                yaw.to_degrees(),
                self.recenter_yaw.to_degrees()
            );
        }

        self.destroy_stage_spaces(runtime)?;

        let fake_stage = runtime.create_reference_space(
            xr::ReferenceSpaceType::LOCAL,
            Pose::new(Vec3::new(0.0, FAKE_STAGE_HEIGHT, 0.0), self.recenter_rotation),
        )?;
        self.fake_stage = Some(fake_stage);

        if self.stage_supported {
            let stage = runtime.create_reference_space(
                xr::ReferenceSpaceType::STAGE,
                Pose::new(Vec3::ZERO, self.recenter_rotation),
            )?;
            self.stage = Some(stage);
        }

        self.current = self.stage.or(self.fake_stage);
        info!(
            "Current space: {}",
            if self.stage.is_some() { "stage" } else { "fake stage" }
        );
        Ok(())
    }

    fn destroy_stage_spaces<R: XrRuntime + ?Sized>(&mut self, runtime: &mut R) -> VrResult<()> {
        self.current = None;
        if let Some(stage) = self.stage.take() {
            runtime.destroy_space(stage)?;
        }
        if let Some(fake) = self.fake_stage.take() {
            runtime.destroy_space(fake)?;
        }
        Ok(())
    }

    /// Destroys every space, head included
    pub fn destroy<R: XrRuntime + ?Sized>(&mut self, runtime: &mut R) -> VrResult<()> {
        self.destroy_stage_spaces(runtime)?;
        runtime.destroy_space(self.head)
    }

    /// Recreates all spaces on a new runtime, keeping the accumulated heading.
    ///
    /// Handles from the old runtime are dropped without being destroyed.
    pub fn rebuild<R: XrRuntime + ?Sized>(&mut self, runtime: &mut R) -> VrResult<()> {
        let fresh = Self::new(runtime)?;
        *self = Self {
            recenter_rotation: self.recenter_rotation,
            recenter_yaw: self.recenter_yaw,
            ..fresh
        };
        self.recenter(runtime, None)
    }
}

// ============================================
// TESTS
// ============================================
