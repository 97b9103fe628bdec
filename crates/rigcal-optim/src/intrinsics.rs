//! Joint refinement of camera intrinsics, distortion and per-view board poses.

use log::debug;
use nalgebra::{DMatrix, DVector};
use rigcal_core::{CalibFlags, Camera, CorrespondenceView, Iso3, Real};
use rigcal_linear::{PlanarPnp, PnpError};
use thiserror::Error;

use crate::jacobian::fill_columns;
use crate::params::{pack_pose, unpack_pose, IntrinsicsLayout, POSE_DIM};
use crate::{LmBackend, NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};

/// Fewest correspondences a view needs to constrain its pose.
pub const MIN_VIEW_POINTS: usize = 4;

/// Residual assigned to each axis of a point that lands behind the camera.
pub(crate) const BEHIND_CAMERA_RESIDUAL: Real = 1e4;

#[derive(Debug, Error)]
pub enum IntrinsicsSolveError {
    #[error("no views to solve")]
    NoViews,
    #[error("view {view} has {count} points, need at least {MIN_VIEW_POINTS}")]
    TooFewPoints { view: usize, count: usize },
    #[error("initial pose for view {view} failed: {source}")]
    InitialPose {
        view: usize,
        #[source]
        source: PnpError,
    },
    #[error("solver produced a non-finite or non-positive camera")]
    Diverged,
}

/// Pixel residuals `(du, dv)` of every point in `view`.
pub(crate) fn push_view_residuals(camera: &Camera, pose: &Iso3, view: &CorrespondenceView, out: &mut Vec<Real>) {
    for (p3, px) in view.iter() {
        match camera.project_point(pose, p3) {
            Some(proj) => out.extend([proj.x - px.x, proj.y - px.y]),
            None => out.extend([BEHIND_CAMERA_RESIDUAL, BEHIND_CAMERA_RESIDUAL]),
        }
    }
}

/// Euclidean reprojection error per point.
pub fn reprojection_errors(camera: &Camera, pose: &Iso3, view: &CorrespondenceView) -> Vec<Real> {
    view.iter()
        .map(|(p3, px)| match camera.project_point(pose, p3) {
            Some(proj) => (proj - px).norm(),
            None => Real::INFINITY,
        })
        .collect()
}

/// RMS over points from a stacked `(du, dv)` residual vector.
pub(crate) fn point_rms(residuals: &[Real]) -> Real {
    let points = residuals.len() / 2;
    if points == 0 {
        return 0.0;
    }
    let ss: Real = residuals.iter().map(|r| r * r).sum();
    (ss / points as Real).sqrt()
}

/// Parameter vector: `[camera block | pose_0 | pose_1 | ...]`.
pub struct IntrinsicsProblem<'a> {
    views: &'a [CorrespondenceView],
    layout: IntrinsicsLayout,
    row_offsets: Vec<usize>,
    num_residuals: usize,
}

impl<'a> IntrinsicsProblem<'a> {
    pub fn new(views: &'a [CorrespondenceView], layout: IntrinsicsLayout) -> Self {
        let mut row_offsets = Vec::with_capacity(views.len());
        let mut rows = 0;
        for v in views {
            row_offsets.push(rows);
            rows += 2 * v.len();
        }
        Self {
            views,
            layout,
            row_offsets,
            num_residuals: rows,
        }
    }

    fn pose_offset(&self, view: usize) -> usize {
        self.layout.len() + POSE_DIM * view
    }

    pub fn pack(&self, camera: &Camera, poses: &[Iso3]) -> DVector<Real> {
        let mut x = self.layout.pack(camera);
        for pose in poses {
            x.extend(pack_pose(pose));
        }
        DVector::from_vec(x)
    }

    pub fn unpack(&self, x: &DVector<Real>) -> (Camera, Vec<Iso3>) {
        let s = x.as_slice();
        let camera = self.layout.unpack(&s[..self.layout.len()]);
        let poses = (0..self.views.len())
            .map(|i| unpack_pose(&s[self.pose_offset(i)..]))
            .collect();
        (camera, poses)
    }
}

impl NllsProblem for IntrinsicsProblem<'_> {
    fn num_params(&self) -> usize {
        self.pose_offset(self.views.len())
    }

    fn num_residuals(&self) -> usize {
        self.num_residuals
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let (camera, poses) = self.unpack(x);
        let mut r = Vec::with_capacity(self.num_residuals);
        for (view, pose) in self.views.iter().zip(&poses) {
            push_view_residuals(&camera, pose, view, &mut r);
        }
        DVector::from_vec(r)
    }

    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let mut jac = DMatrix::zeros(self.num_residuals, self.num_params());
        fill_columns(&mut jac, 0, 0..self.layout.len(), x, |p| self.residuals(p));

        let camera = self.layout.unpack(&x.as_slice()[..self.layout.len()]);
        for (i, view) in self.views.iter().enumerate() {
            let off = self.pose_offset(i);
            fill_columns(&mut jac, self.row_offsets[i], off..off + POSE_DIM, x, |p| {
                let pose = unpack_pose(&p.as_slice()[off..]);
                let mut r = Vec::with_capacity(2 * view.len());
                push_view_residuals(&camera, &pose, view, &mut r);
                DVector::from_vec(r)
            });
        }
        jac
    }
}

/// Output of [`calibrate_intrinsics`].
#[derive(Debug, Clone)]
pub struct IntrinsicsSolution {
    pub camera: Camera,
    /// Board-to-camera pose per input view.
    pub poses: Vec<Iso3>,
    /// Reprojection RMS over all points, in pixels.
    pub rms: Real,
    pub per_view_rms: Vec<Real>,
    pub report: SolveReport,
}

/// Refine `initial` and per-view poses against all views.
///
/// Initial poses come from the closed-form planar solve under `initial`.
/// Which parameters move is decided by `flags`.
pub fn calibrate_intrinsics(
    views: &[CorrespondenceView],
    initial: &Camera,
    flags: CalibFlags,
    opts: &SolveOptions,
) -> Result<IntrinsicsSolution, IntrinsicsSolveError> {
    if views.is_empty() {
        return Err(IntrinsicsSolveError::NoViews);
    }
    if let Some((view, v)) = views.iter().enumerate().find(|(_, v)| v.len() < MIN_VIEW_POINTS) {
        return Err(IntrinsicsSolveError::TooFewPoints {
            view,
            count: v.len(),
        });
    }

    let layout = IntrinsicsLayout::new(initial, flags);
    let start = *layout.base();
    let poses = views
        .iter()
        .enumerate()
        .map(|(view, v)| {
            PlanarPnp::direct(v, &start).map_err(|source| IntrinsicsSolveError::InitialPose { view, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let problem = IntrinsicsProblem::new(views, layout);
    let x0 = problem.pack(&start, &poses);
    let (x, report) = LmBackend.solve(&problem, x0, opts);
    if x.iter().any(|v| !v.is_finite()) {
        return Err(IntrinsicsSolveError::Diverged);
    }
    let (camera, poses) = problem.unpack(&x);
    if camera.intrinsics.fx <= 0.0 || camera.intrinsics.fy <= 0.0 {
        return Err(IntrinsicsSolveError::Diverged);
    }

    let per_view_rms: Vec<Real> = views
        .iter()
        .zip(&poses)
        .map(|(v, pose)| {
            let mut r = Vec::with_capacity(2 * v.len());
            push_view_residuals(&camera, pose, v, &mut r);
            point_rms(&r)
        })
        .collect();
    let rms = point_rms(problem.residuals(&x).as_slice());
    debug!(
        "intrinsics: {} views, rms {:.4}px, fx {:.2} fy {:.2} ({} evals)",
        views.len(),
        rms,
        camera.intrinsics.fx,
        camera.intrinsics.fy,
        report.evaluations
    );

    Ok(IntrinsicsSolution {
        camera,
        poses,
        rms,
        per_view_rms,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcal_core::synthetic::{board_poses, observe};
    use rigcal_core::{CalibFlag, CameraModel, CharucoBoard, Distortion, FxFyCxCySkew, Resolution};

    fn views(camera: &Camera, n: usize) -> Vec<CorrespondenceView> {
        let board = CharucoBoard::new(8, 6, 30.0, 22.0).unwrap();
        let res = Resolution::new(1280, 800);
        board_poses(&board, n, 600.0)
            .iter()
            .map(|pose| observe(camera, &board, pose, res).to_view(&board).unwrap())
            .collect()
    }

    #[test]
    fn recovers_perspective_camera_from_perturbed_guess() {
        let gt = Camera::new(
            FxFyCxCySkew {
                fx: 1000.0,
                fy: 995.0,
                cx: 645.0,
                cy: 395.0,
                skew: 0.0,
            },
            Distortion::from_coefficients(CameraModel::Perspective, &[-0.12, 0.05, 0.0005, -0.0003, 0.0]),
        );
        let views = views(&gt, 10);
        let guess = Camera::new(
            FxFyCxCySkew {
                fx: 960.0,
                fy: 960.0,
                cx: 640.0,
                cy: 400.0,
                skew: 0.0,
            },
            Distortion::zero(CameraModel::Perspective),
        );
        let flags = CalibFlags::empty().with(CalibFlag::FixK3);

        let sol = calibrate_intrinsics(&views, &guess, flags, &SolveOptions::default()).unwrap();
        assert!(sol.rms < 1e-4, "rms {}", sol.rms);
        assert!((sol.camera.intrinsics.fx - 1000.0).abs() < 1e-2);
        assert!((sol.camera.intrinsics.cy - 395.0).abs() < 1e-2);
        let k = sol.camera.distortion.coefficients();
        assert!((k[0] + 0.12).abs() < 1e-4 && (k[1] - 0.05).abs() < 1e-4, "{k:?}");
        assert_eq!(sol.per_view_rms.len(), 10);
    }

    #[test]
    fn rejects_views_with_too_few_points() {
        let cam = Camera::new(
            FxFyCxCySkew::from_hfov(1280, 800, 70.0),
            Distortion::zero(CameraModel::Perspective),
        );
        let mut v = views(&cam, 3);
        v[1] = v[1].truncated(3);
        let err = calibrate_intrinsics(&v, &cam, CalibFlags::default(), &SolveOptions::default())
            .unwrap_err();
        assert!(matches!(err, IntrinsicsSolveError::TooFewPoints { view: 1, count: 3 }));
    }
}
