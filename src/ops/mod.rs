pub mod mask_raster;
