use bevy::prelude::*;

#[derive(Component)]
pub struct MainCamera;

pub fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    // 1) Light
    commands.spawn((
        DirectionalLight {
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(30.0, 60.0, 20.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    // 2) Camera
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(-10.0, 45.0, 70.0).looking_at(Vec3::ZERO, Vec3::Y),
        MainCamera,
    ));

    // 3) Ground
    commands.spawn((
        Mesh3d(meshes.add(Plane3d::default().mesh().size(140.0, 60.0))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(0.32, 0.36, 0.28),
            perceptual_roughness: 1.0,
            ..default()
        })),
        Transform::default(),
    ));
}
