use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use deeprender_core::volume::split_difference;
use deeprender_core::Volume;
use proptest::prelude::*;

type Backend = NdArray<f32>;

proptest! {
    #[test]
    fn test_padding_reaches_canonical_extent(
        d in 1usize..12, h in 1usize..12, w in 1usize..12,
        extra_d in 0usize..6, extra_h in 0usize..6, extra_w in 0usize..6,
    ) {
        let device = Default::default();
        let extent = [d + extra_d, h + extra_h, w + extra_w];
        let data = Tensor::<Backend, 3>::ones([d, h, w], &device);

        let volume = Volume::new(data).conform(extent).unwrap();
        prop_assert_eq!(volume.dims(), extent);

        // Every original voxel survives, nothing else is non-zero.
        let total: f32 = volume.into_data().sum().into_scalar();
        prop_assert_eq!(total as usize, d * h * w);
    }

    #[test]
    fn test_padding_is_symmetric(canonical in 1usize..300, actual in 1usize..300) {
        prop_assume!(actual <= canonical);
        let (leading, trailing) = split_difference(canonical, actual);
        prop_assert_eq!(leading + actual + trailing, canonical);
        prop_assert!(trailing == leading || trailing == leading + 1);
        if (canonical - actual) % 2 == 0 {
            prop_assert_eq!(leading, trailing);
        }
    }

    #[test]
    fn test_cropping_keeps_centre(actual in 4usize..20, cut in 0usize..4) {
        let device = Default::default();
        let canonical = actual - cut;
        let values: Vec<f32> = (0..actual).map(|v| v as f32).collect();
        let data = Tensor::<Backend, 1>::from_floats(values.as_slice(), &device)
            .reshape([actual, 1, 1]);

        let volume = Volume::new(data).conform([canonical, 1, 1]).unwrap();
        let first: f32 = volume.data().clone().narrow(0, 0, 1).into_scalar();
        prop_assert_eq!(first as usize, cut / 2);
    }
}

#[test]
fn test_canonical_volume_is_untouched() {
    let device = Default::default();
    let data = Tensor::<Backend, 3>::random([8, 8, 8], burn::tensor::Distribution::Uniform(0.0, 255.0), &device);
    let volume = Volume::new(data.clone()).conform([8, 8, 8]).unwrap();
    volume.data().to_data().assert_eq(&data.to_data(), true);
}
