//! Native GeoTIFF reading/writing on top of the `tiff` crate
//!
//! Only the first image of a file is read, as a single band. Georeferencing
//! comes from ModelPixelScale + ModelTiepoint tags; everything else in the
//! GeoKey directory is ignored.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Image, Raster, RasterElement};
use num_traits::NumCast;
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// GeoTIFF tags by code. `tiff` decodes known codes into named variants,
/// so lookups through `Tag::Unknown` would never match.
fn geo_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Read a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T: RasterElement>(data: &[u8]) -> Result<Raster<T>> {
    decode_geotiff(Cursor::new(data))
}

fn cast_all<S: Copy + NumCast, T: RasterElement>(buf: Vec<S>) -> Vec<T> {
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
        .collect()
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder =
        Decoder::new(reader).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
    let (rows, cols) = (height as usize, width as usize);

    let decoded = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let data: Vec<T> = match decoded {
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    if let Some(nodata) = read_nodata::<T, R>(&mut decoder) {
        raster.set_nodata(Some(nodata));
    }

    Ok(raster)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(geo_tag(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(geo_tag(MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z]; scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_nodata<T: RasterElement, R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<T> {
    let text = decoder.get_tag_ascii_string(geo_tag(GDAL_NODATA)).ok()?;
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    num_traits::cast(value)
}

/// Write a Raster to a GeoTIFF file as 32-bit float
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, file)
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T: RasterElement>(raster: &Raster<T>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

/// Write every band of an image to `<dir>/<prefix><band>.tif`.
///
/// Spaces in band names become underscores. Returns the written paths in
/// band order.
pub fn write_image<P: AsRef<Path>>(image: &Image, dir: P, prefix: &str) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir.as_ref())?;
    image
        .iter()
        .map(|(name, band)| {
            let file_name = format!("{}{}.tif", prefix, name.replace(' ', "_"));
            let path = dir.as_ref().join(file_name);
            write_geotiff(band, &path)?;
            Ok(path)
        })
        .collect()
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder =
        TiffEncoder::new(writer).map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();
    let nodata = raster.nodata();
    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| {
            if v.is_nodata(nodata) {
                f32::NAN
            } else {
                num_traits::cast(v).unwrap_or(f32::NAN)
            }
        })
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();
    let tag_err = |e: tiff::TiffError| Error::Other(format!("Cannot write GeoTIFF tag: {}", e));

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(geo_tag(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(tag_err)?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(geo_tag(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(tag_err)?;

    // Version 1.1.0 with two keys: projected model, pixel-is-area
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];
    image
        .encoder()
        .write_tag(geo_tag(GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(tag_err)?;

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn buffer_roundtrip_keeps_values_and_grid() {
        let mut raster = Raster::from_vec(vec![0.1, 0.2, f64::NAN, 0.4, 0.5, 0.6], 2, 3).unwrap();
        raster.set_transform(GeoTransform::new(500.0, 1000.0, 10.0, -10.0));

        let bytes = write_geotiff_to_buffer(&raster).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&bytes).unwrap();

        assert_eq!(back.shape(), (2, 3));
        assert_relative_eq!(back.get(1, 2).unwrap(), 0.6, epsilon = 1e-6);
        assert!(back.get(0, 2).unwrap().is_nan());
        assert_relative_eq!(back.transform().origin_x, 500.0);
        assert_relative_eq!(back.transform().pixel_height, -10.0);
    }

    #[test]
    fn file_roundtrip_keeps_cell_size_for_scale_strides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b8.tif");
        let mut raster = Raster::filled(4, 4, 0.25);
        raster.set_transform(GeoTransform::new(556_000.0, 4_460_000.0, 10.0, -10.0));

        write_geotiff(&raster, &path).unwrap();
        let back: Raster<f64> = read_geotiff(&path).unwrap();

        assert_eq!(back.transform(), raster.transform());
        assert_relative_eq!(back.cell_size(), 10.0);
        assert_eq!(back.transform().stride_for_scale(30.0), 3);
    }

    #[test]
    fn gdal_nodata_tag_is_read() {
        let mut buf = Vec::new();
        {
            let mut encoder = TiffEncoder::new(Cursor::new(&mut buf)).unwrap();
            let mut image = encoder.new_image::<Gray32Float>(2, 1).unwrap();
            image.encoder().write_tag(geo_tag(GDAL_NODATA), "-9999").unwrap();
            image.write_data(&[1.0f32, -9999.0]).unwrap();
        }
        let back: Raster<f64> = read_geotiff_from_buffer(&buf).unwrap();
        assert_eq!(back.nodata(), Some(-9999.0));
    }

    #[test]
    fn write_image_names_files_by_band() {
        let dir = tempfile::tempdir().unwrap();
        let image = Image::from_bands([("NBR delta", Raster::filled(2, 2, -0.3))]).unwrap();

        let paths = write_image(&image, dir.path(), "fire_").unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("fire_NBR_delta.tif"));
        let back: Raster<f64> = read_geotiff(&paths[0]).unwrap();
        assert_relative_eq!(back.get(1, 1).unwrap(), -0.3, epsilon = 1e-6);
    }
}
