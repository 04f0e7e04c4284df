use burn::tensor::{Distribution, Tensor};
use burn_ndarray::NdArray;
use deeprender_core::{
    AlphaCompositor, CompositeOrder, OpacityLut, PlaneRotation, RotationPlane, Volume,
};

type Backend = NdArray<f32>;

#[test]
fn test_zero_volume_synthesis_is_black() {
    let device = Default::default();
    let data = Tensor::<Backend, 3>::zeros([12, 10, 10], &device);

    let volume = Volume::new(data).conform([16, 16, 16]).unwrap().ray_axis_last();
    let volume = PlaneRotation::new(73.0, RotationPlane::CrossSection).apply(volume).clip();
    let projection = AlphaCompositor::default()
        .project(&volume, &OpacityLut::default())
        .unwrap();

    let rgb = projection.to_rgb();
    assert_eq!(rgb.dims(), [1, 16, 16, 3]);
    assert_eq!(rgb.abs().max().into_scalar(), 0.0);
    assert_eq!(projection.alpha.max().into_scalar(), 0.0);
}

#[test]
fn test_rotated_volume_stays_in_range() {
    let device = Default::default();
    let data = Tensor::<Backend, 3>::random([10, 10, 10], Distribution::Uniform(0.0, 255.0), &device);

    let volume = Volume::new(data).ray_axis_last();
    let rotated = PlaneRotation::new(31.0, RotationPlane::Turntable).apply(volume).clip();

    assert_eq!(rotated.dims(), [10, 10, 10]);
    assert!(rotated.data().clone().min().into_scalar() >= 0.0);
    assert!(rotated.data().clone().max().into_scalar() <= 255.0);
}

#[test]
fn test_projection_bounded_for_opaque_lut() {
    let device = Default::default();
    let data = Tensor::<Backend, 3>::random([6, 6, 20], Distribution::Uniform(0.0, 255.0), &device);
    let volume = Volume::from_ray_last(data);

    for order in [CompositeOrder::BackToFront, CompositeOrder::FrontToBack] {
        let projection = AlphaCompositor::new(order)
            .project(&volume, &OpacityLut::constant(255))
            .unwrap();
        let alpha_max = projection.alpha.clone().max().into_scalar();
        let alpha_min = projection.alpha.min().into_scalar();
        assert!(alpha_max <= 1.0 + 1e-6);
        assert!(alpha_min >= 1.0 - 1e-6);
    }
}
