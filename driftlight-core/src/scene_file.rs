//! On-disk scene format (conventionally `.dlscene`).
//!
//! A small versioned binary container for the [`crate::catalogue::Catalogue`]
//! state that isn't GPU-resident: tile infos, models (plus their mesh
//! bounds), textures (including raw mip bytes), materials, renderables and
//! lights. Upload-queue bookkeeping (`MeshGpuState`, bindless slots,
//! BLAS addresses) is never written — loading a scene re-enters the normal
//! upload path the same way a freshly added asset would.
//!
//! Encoded with `byteorder` over a plain cursor rather than `serde`: the
//! layout is a fixed sequence of little-endian sections, not a
//! self-describing format, so there's nothing for a derive to buy us here.
//! `serde_json` stays reserved for [`crate::session_config`].

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{Mat4, Vec3, Vec4};

use crate::catalogue::{AssetUpdate, Catalogue, Light, Material, Model, Renderable, Texture, TextureFormat, TileInfo};
use crate::error::{Error, Result};
use crate::ids::{AssetId, TileIndex};

const MAGIC: &[u8; 4] = b"DLSC";
const CURRENT_VERSION: u8 = 1;

/// Serialize every asset in `catalogue` into a `.dlscene` byte buffer.
pub fn write_scene(catalogue: &Catalogue) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_header(&mut out)?;
    write_tile_infos(&mut out, catalogue)?;
    write_models(&mut out, catalogue)?;
    write_textures(&mut out, catalogue)?;
    write_materials(&mut out, catalogue)?;
    write_renderables(&mut out, catalogue)?;
    write_lights(&mut out, catalogue)?;
    Ok(out)
}

/// Parse a `.dlscene` buffer into one [`AssetUpdate`], ready for
/// [`Catalogue::apply_update`]. Doesn't construct a `Catalogue` itself, so
/// loading into an already-populated scene (additive load) and loading into
/// a fresh one share the same path.
pub fn read_scene(bytes: &[u8]) -> Result<AssetUpdate> {
    let mut cursor = Cursor::new(bytes);
    read_header(&mut cursor)?;

    let mut update = AssetUpdate::default();
    update.added_tile_infos = read_tile_infos(&mut cursor)?;
    update.added_models = read_models(&mut cursor)?;
    update.added_textures = read_textures(&mut cursor)?;
    update.added_materials = read_materials(&mut cursor)?;
    update.added_renderables = read_renderables(&mut cursor)?;
    update.added_lights = read_lights(&mut cursor)?;
    Ok(update)
}

/// Read `path`, apply its contents to a fresh [`Catalogue`] sized for
/// `multi_buffer_count` frames in flight, and return it.
pub fn load_scene(path: impl AsRef<std::path::Path>, multi_buffer_count: usize) -> Result<Catalogue> {
    let bytes = std::fs::read(path.as_ref()).map_err(|e| Error::InitializationFailed(e.to_string()))?;
    let update = read_scene(&bytes)?;
    let mut catalogue = Catalogue::new(multi_buffer_count);
    catalogue.apply_update(update);
    Ok(catalogue)
}

/// Serialize `catalogue` and write it to `path`, creating parent
/// directories if necessary.
pub fn save_scene(catalogue: &Catalogue, path: impl AsRef<std::path::Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::InitializationFailed(e.to_string()))?;
    }
    let bytes = write_scene(catalogue)?;
    std::fs::write(path, bytes).map_err(|e| Error::InitializationFailed(e.to_string()))
}

fn io_err(e: io::Error) -> Error {
    Error::InvalidResource(format!("malformed scene file: {e}"))
}

fn write_header(out: &mut Vec<u8>) -> Result<()> {
    out.write_all(MAGIC).map_err(io_err)?;
    out.write_u8(CURRENT_VERSION).map_err(io_err)
}

fn read_header(cursor: &mut Cursor<&[u8]>) -> Result<()> {
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic).map_err(io_err)?;
    if &magic != MAGIC {
        return Err(Error::InvalidResource("scene file missing DLSC magic".into()));
    }
    let version = cursor.read_u8().map_err(io_err)?;
    if version != CURRENT_VERSION {
        return Err(Error::InvalidResource(format!("scene file version {version} unsupported, expected {CURRENT_VERSION}")));
    }
    Ok(())
}

fn write_string(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    out.write_u16::<LittleEndian>(bytes.len() as u16).map_err(io_err)?;
    out.write_all(bytes).map_err(io_err)
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cursor.read_u16::<LittleEndian>().map_err(io_err)? as usize;
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf).map_err(io_err)?;
    String::from_utf8(buf).map_err(|e| Error::InvalidResource(format!("scene file string is not utf-8: {e}")))
}

fn write_asset_id(out: &mut Vec<u8>, id: AssetId) -> Result<()> {
    let (hi, lo) = id.raw();
    out.write_u64::<LittleEndian>(hi).map_err(io_err)?;
    out.write_u64::<LittleEndian>(lo).map_err(io_err)
}

fn read_asset_id(cursor: &mut Cursor<&[u8]>) -> Result<AssetId> {
    let hi = cursor.read_u64::<LittleEndian>().map_err(io_err)?;
    let lo = cursor.read_u64::<LittleEndian>().map_err(io_err)?;
    Ok(AssetId::from_raw(hi, lo))
}

fn write_option_asset_id(out: &mut Vec<u8>, id: Option<AssetId>) -> Result<()> {
    match id {
        Some(id) => {
            out.write_u8(1).map_err(io_err)?;
            write_asset_id(out, id)
        }
        None => out.write_u8(0).map_err(io_err),
    }
}

fn read_option_asset_id(cursor: &mut Cursor<&[u8]>) -> Result<Option<AssetId>> {
    match cursor.read_u8().map_err(io_err)? {
        0 => Ok(None),
        _ => Ok(Some(read_asset_id(cursor)?)),
    }
}

fn write_vec3(out: &mut Vec<u8>, v: Vec3) -> Result<()> {
    for c in v.to_array() {
        out.write_f32::<LittleEndian>(c).map_err(io_err)?;
    }
    Ok(())
}

fn read_vec3(cursor: &mut Cursor<&[u8]>) -> Result<Vec3> {
    let x = cursor.read_f32::<LittleEndian>().map_err(io_err)?;
    let y = cursor.read_f32::<LittleEndian>().map_err(io_err)?;
    let z = cursor.read_f32::<LittleEndian>().map_err(io_err)?;
    Ok(Vec3::new(x, y, z))
}

fn write_vec4(out: &mut Vec<u8>, v: Vec4) -> Result<()> {
    for c in v.to_array() {
        out.write_f32::<LittleEndian>(c).map_err(io_err)?;
    }
    Ok(())
}

fn read_vec4(cursor: &mut Cursor<&[u8]>) -> Result<Vec4> {
    let x = cursor.read_f32::<LittleEndian>().map_err(io_err)?;
    let y = cursor.read_f32::<LittleEndian>().map_err(io_err)?;
    let z = cursor.read_f32::<LittleEndian>().map_err(io_err)?;
    let w = cursor.read_f32::<LittleEndian>().map_err(io_err)?;
    Ok(Vec4::new(x, y, z, w))
}

fn write_mat4(out: &mut Vec<u8>, m: Mat4) -> Result<()> {
    for c in m.to_cols_array() {
        out.write_f32::<LittleEndian>(c).map_err(io_err)?;
    }
    Ok(())
}

fn read_mat4(cursor: &mut Cursor<&[u8]>) -> Result<Mat4> {
    let mut cols = [0f32; 16];
    for c in &mut cols {
        *c = cursor.read_f32::<LittleEndian>().map_err(io_err)?;
    }
    Ok(Mat4::from_cols_array(&cols))
}

fn write_tile_infos(out: &mut Vec<u8>, catalogue: &Catalogue) -> Result<()> {
    let tiles: Vec<&TileInfo> = catalogue.tile_infos().collect();
    out.write_u32::<LittleEndian>(tiles.len() as u32).map_err(io_err)?;
    for tile in tiles {
        out.write_i32::<LittleEndian>(tile.index.x).map_err(io_err)?;
        out.write_i32::<LittleEndian>(tile.index.z).map_err(io_err)?;
        write_option_asset_id(out, tile.ddgi_atlas)?;
    }
    Ok(())
}

fn read_tile_infos(cursor: &mut Cursor<&[u8]>) -> Result<Vec<TileInfo>> {
    let count = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let x = cursor.read_i32::<LittleEndian>().map_err(io_err)?;
        let z = cursor.read_i32::<LittleEndian>().map_err(io_err)?;
        let ddgi_atlas = read_option_asset_id(cursor)?;
        let mut tile = TileInfo::new(TileIndex::new(x, z));
        tile.ddgi_atlas = ddgi_atlas;
        out.push(tile);
    }
    Ok(out)
}

fn write_models(out: &mut Vec<u8>, catalogue: &Catalogue) -> Result<()> {
    let models: Vec<&Model> = catalogue.models().collect();
    out.write_u32::<LittleEndian>(models.len() as u32).map_err(io_err)?;
    for model in models {
        write_asset_id(out, model.id)?;
        write_string(out, &model.name)?;
        out.write_u32::<LittleEndian>(model.mesh_ids.len() as u32).map_err(io_err)?;
        for &mesh_id in &model.mesh_ids {
            write_asset_id(out, mesh_id)?;
            let mesh = catalogue.mesh(mesh_id).ok_or_else(|| Error::UnknownId(mesh_id.to_string()))?;
            write_vec3(out, mesh.aabb_min)?;
            write_vec3(out, mesh.aabb_max)?;
        }
    }
    Ok(())
}

fn read_models(cursor: &mut Cursor<&[u8]>) -> Result<Vec<(Model, Vec<(Vec3, Vec3)>)>> {
    let count = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = read_asset_id(cursor)?;
        let name = read_string(cursor)?;
        let mesh_count = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
        let mut mesh_ids = Vec::with_capacity(mesh_count as usize);
        let mut bounds = Vec::with_capacity(mesh_count as usize);
        for _ in 0..mesh_count {
            mesh_ids.push(read_asset_id(cursor)?);
            let aabb_min = read_vec3(cursor)?;
            let aabb_max = read_vec3(cursor)?;
            bounds.push((aabb_min, aabb_max));
        }
        out.push((Model::new(id, name, mesh_ids), bounds));
    }
    Ok(out)
}

fn texture_format_to_u8(format: TextureFormat) -> u8 {
    match format {
        TextureFormat::RGBA8_UNORM => 0,
        TextureFormat::RGBA8_SRGB => 1,
        TextureFormat::RGB8_SRGB => 2,
        TextureFormat::RGB8_UNORM => 3,
        TextureFormat::RG8_UNORM => 4,
        TextureFormat::R8_UNORM => 5,
        TextureFormat::R16_UNORM => 6,
        TextureFormat::RGBA16F => 7,
        TextureFormat::BC7_SRGB => 8,
        TextureFormat::BC7_UNORM => 9,
        TextureFormat::BC5_UNORM => 10,
    }
}

fn texture_format_from_u8(tag: u8) -> Result<TextureFormat> {
    Ok(match tag {
        0 => TextureFormat::RGBA8_UNORM,
        1 => TextureFormat::RGBA8_SRGB,
        2 => TextureFormat::RGB8_SRGB,
        3 => TextureFormat::RGB8_UNORM,
        4 => TextureFormat::RG8_UNORM,
        5 => TextureFormat::R8_UNORM,
        6 => TextureFormat::R16_UNORM,
        7 => TextureFormat::RGBA16F,
        8 => TextureFormat::BC7_SRGB,
        9 => TextureFormat::BC7_UNORM,
        10 => TextureFormat::BC5_UNORM,
        other => return Err(Error::InvalidResource(format!("unknown texture format tag {other}"))),
    })
}

fn write_textures(out: &mut Vec<u8>, catalogue: &Catalogue) -> Result<()> {
    let textures: Vec<&Texture> = catalogue.textures().collect();
    out.write_u32::<LittleEndian>(textures.len() as u32).map_err(io_err)?;
    for tex in textures {
        write_asset_id(out, tex.id)?;
        out.write_u8(texture_format_to_u8(tex.format)).map_err(io_err)?;
        out.write_u32::<LittleEndian>(tex.width).map_err(io_err)?;
        out.write_u32::<LittleEndian>(tex.height).map_err(io_err)?;
        out.write_u8(tex.clamp_to_edge as u8).map_err(io_err)?;
        out.write_u32::<LittleEndian>(tex.mips.len() as u32).map_err(io_err)?;
        for mip in &tex.mips {
            out.write_u32::<LittleEndian>(mip.len() as u32).map_err(io_err)?;
            out.write_all(mip).map_err(io_err)?;
        }
    }
    Ok(())
}

fn read_textures(cursor: &mut Cursor<&[u8]>) -> Result<Vec<Texture>> {
    let count = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = read_asset_id(cursor)?;
        let format = texture_format_from_u8(cursor.read_u8().map_err(io_err)?)?;
        let width = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
        let height = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
        let clamp_to_edge = cursor.read_u8().map_err(io_err)? != 0;
        let mip_count = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
        let mut mips = Vec::with_capacity(mip_count as usize);
        for _ in 0..mip_count {
            let len = cursor.read_u32::<LittleEndian>().map_err(io_err)? as usize;
            let mut blob = vec![0u8; len];
            cursor.read_exact(&mut blob).map_err(io_err)?;
            mips.push(blob);
        }
        out.push(Texture::new(id, format, width, height, mips, clamp_to_edge));
    }
    Ok(out)
}

fn write_materials(out: &mut Vec<u8>, catalogue: &Catalogue) -> Result<()> {
    let materials: Vec<&Material> = catalogue.materials().collect();
    out.write_u32::<LittleEndian>(materials.len() as u32).map_err(io_err)?;
    for mat in materials {
        write_asset_id(out, mat.id)?;
        write_vec3(out, mat.base_color_factor)?;
        write_vec4(out, mat.emissive)?;
        out.write_f32::<LittleEndian>(mat.metallic_factor).map_err(io_err)?;
        out.write_f32::<LittleEndian>(mat.roughness_factor).map_err(io_err)?;
        write_option_asset_id(out, mat.metallic_roughness_tex)?;
        write_option_asset_id(out, mat.albedo_tex)?;
        write_option_asset_id(out, mat.normal_tex)?;
        write_option_asset_id(out, mat.emissive_tex)?;
    }
    Ok(())
}

fn read_materials(cursor: &mut Cursor<&[u8]>) -> Result<Vec<Material>> {
    let count = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = read_asset_id(cursor)?;
        let mut mat = Material::new(id);
        mat.base_color_factor = read_vec3(cursor)?;
        mat.emissive = read_vec4(cursor)?;
        mat.metallic_factor = cursor.read_f32::<LittleEndian>().map_err(io_err)?;
        mat.roughness_factor = cursor.read_f32::<LittleEndian>().map_err(io_err)?;
        mat.metallic_roughness_tex = read_option_asset_id(cursor)?;
        mat.albedo_tex = read_option_asset_id(cursor)?;
        mat.normal_tex = read_option_asset_id(cursor)?;
        mat.emissive_tex = read_option_asset_id(cursor)?;
        out.push(mat);
    }
    Ok(out)
}

fn write_renderables(out: &mut Vec<u8>, catalogue: &Catalogue) -> Result<()> {
    let renderables: Vec<&Renderable> = catalogue.renderables().collect();
    out.write_u32::<LittleEndian>(renderables.len() as u32).map_err(io_err)?;
    for r in renderables {
        write_asset_id(out, r.id)?;
        write_string(out, &r.name)?;
        write_asset_id(out, r.model)?;
        write_option_asset_id(out, r.skeleton)?;
        out.write_u32::<LittleEndian>(r.materials.len() as u32).map_err(io_err)?;
        for &mat_id in &r.materials {
            write_asset_id(out, mat_id)?;
        }
        write_mat4(out, r.transform)?;
        write_vec3(out, r.tint)?;
        write_vec4(out, r.bounding_sphere)?;
        out.write_u8(r.visible as u8).map_err(io_err)?;
    }
    Ok(())
}

fn read_renderables(cursor: &mut Cursor<&[u8]>) -> Result<Vec<Renderable>> {
    let count = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = read_asset_id(cursor)?;
        let name = read_string(cursor)?;
        let model = read_asset_id(cursor)?;
        let skeleton = read_option_asset_id(cursor)?;
        let mat_count = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
        let mut materials = Vec::with_capacity(mat_count as usize);
        for _ in 0..mat_count {
            materials.push(read_asset_id(cursor)?);
        }
        let mut r = Renderable::new(id, name, model, materials);
        r.skeleton = skeleton;
        r.transform = read_mat4(cursor)?;
        r.tint = read_vec3(cursor)?;
        r.bounding_sphere = read_vec4(cursor)?;
        r.visible = cursor.read_u8().map_err(io_err)? != 0;
        out.push(r);
    }
    Ok(out)
}

fn write_lights(out: &mut Vec<u8>, catalogue: &Catalogue) -> Result<()> {
    let lights: Vec<&Light> = catalogue.lights().collect();
    out.write_u32::<LittleEndian>(lights.len() as u32).map_err(io_err)?;
    for light in lights {
        write_asset_id(out, light.id)?;
        write_string(out, &light.name)?;
        write_vec3(out, light.pos)?;
        write_vec3(out, light.color)?;
        out.write_f32::<LittleEndian>(light.range).map_err(io_err)?;
        out.write_u8(light.enabled as u8).map_err(io_err)?;
        out.write_u8(light.shadow_caster as u8).map_err(io_err)?;
    }
    Ok(())
}

fn read_lights(cursor: &mut Cursor<&[u8]>) -> Result<Vec<Light>> {
    let count = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = read_asset_id(cursor)?;
        let name = read_string(cursor)?;
        let pos = read_vec3(cursor)?;
        let color = read_vec3(cursor)?;
        let range = cursor.read_f32::<LittleEndian>().map_err(io_err)?;
        let enabled = cursor.read_u8().map_err(io_err)? != 0;
        let shadow_caster = cursor.read_u8().map_err(io_err)? != 0;

        let mut light = Light::new(id, name, pos, color, range);
        light.enabled = enabled;
        light.shadow_caster = shadow_caster;
        light.recompute_shadow();
        out.push(light);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::AssetUpdate;

    fn sample_catalogue() -> Catalogue {
        let mut catalogue = Catalogue::new(2);

        let mesh_id = AssetId::generate();
        let model_id = AssetId::generate();
        let model = Model::new(model_id, "crate", vec![mesh_id]);

        let tex_id = AssetId::generate();
        let texture = Texture::new(tex_id, TextureFormat::RGBA8_SRGB, 4, 4, vec![vec![255u8; 64]], true);

        let mat_id = AssetId::generate();
        let mut material = Material::new(mat_id);
        material.albedo_tex = Some(tex_id);

        let renderable_id = AssetId::generate();
        let mut renderable = Renderable::new(renderable_id, "crate_0", model_id, vec![mat_id]);
        renderable.transform = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));

        let light_id = AssetId::generate();
        let mut light = Light::new(light_id, "sun", Vec3::new(0.0, 10.0, 0.0), Vec3::ONE, 50.0);
        light.shadow_caster = true;
        light.recompute_shadow();

        let mut update = AssetUpdate::default();
        update.added_models.push((model, vec![(Vec3::splat(-1.0), Vec3::splat(1.0))]));
        update.added_textures.push(texture);
        update.added_materials.push(material);
        update.added_renderables.push(renderable);
        update.added_lights.push(light);
        update.added_tile_infos.push(TileInfo::new(TileIndex::new(2, -3)));

        catalogue.apply_update(update);
        catalogue
    }

    #[test]
    fn round_trips_every_section() {
        let original = sample_catalogue();
        let bytes = write_scene(&original).unwrap();

        let mut reloaded = Catalogue::new(2);
        let update = read_scene(&bytes).unwrap();
        reloaded.apply_update(update);

        assert_eq!(reloaded.model_count(), original.model_count());
        assert_eq!(reloaded.mesh_count(), original.mesh_count());
        assert_eq!(reloaded.renderable_count(), original.renderable_count());
        assert_eq!(reloaded.texture_count(), original.texture_count());

        let reloaded_tex = reloaded.textures().next().unwrap();
        assert_eq!(reloaded_tex.mips[0].len(), 64);
        assert!(reloaded_tex.mips[0].iter().all(|&b| b == 255));

        let reloaded_light = reloaded.lights().next().unwrap();
        assert!(reloaded_light.shadow_caster);
        assert!(reloaded_light.shadow.is_some());
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8; 16];
        let err = read_scene(&bytes).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn rejects_future_version() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.push(CURRENT_VERSION + 1);
        let err = read_scene(&bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }
}
